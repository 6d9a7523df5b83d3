pub mod dense;
pub mod dropout;
pub mod param;

pub use dense::Dense;
pub use dropout::Dropout;
pub use param::{Param, ParamKind};
