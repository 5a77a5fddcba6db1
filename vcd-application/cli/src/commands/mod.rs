pub mod delete;
pub mod org;
pub mod output;
pub mod session;
pub mod task;
pub mod vapp;
pub mod vdc;
