pub mod view;
pub mod worker;
