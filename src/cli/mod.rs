pub mod alerts;
pub mod dashboard;
pub mod setup;
pub mod ui;
