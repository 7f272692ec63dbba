pub mod periodic_processor;
pub mod status_transitioner;
