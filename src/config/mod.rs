pub mod credentials;
pub mod runtime;
pub mod settings;

pub use credentials::*;
pub use runtime::*;
pub use settings::*;
