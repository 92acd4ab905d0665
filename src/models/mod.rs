mod activation;
mod cooldown;
mod license;

pub use activation::*;
pub use cooldown::*;
pub use license::*;
