pub mod context;
pub mod helpers;
pub mod history;
pub mod restriction;
pub mod session;
