mod check;
mod compare;

pub use check::run_check;
pub use compare::run_compare;
