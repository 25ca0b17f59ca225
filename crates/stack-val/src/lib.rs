mod types;
pub use types::*;

mod value;
pub use value::*;

mod convert;
pub use convert::*;

mod linear;
pub use linear::*;
