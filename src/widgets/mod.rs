//! User interface components which are reused between the generic views and
//! the module pages.

pub mod actions;
pub mod alert;
pub mod table;
