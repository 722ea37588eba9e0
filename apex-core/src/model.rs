//! Reference implementations of [`QModel`](crate::QModel).
mod linear;
pub use linear::LinearQModel;
