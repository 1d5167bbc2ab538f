pub mod health;
pub mod proxy;
pub mod settings;
pub mod status;

pub use health::*;
pub use proxy::*;
pub use settings::*;
pub use status::*;
