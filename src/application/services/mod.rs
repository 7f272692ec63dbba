pub mod change_feed;
pub mod delivery;
pub mod lifecycle;
pub mod observers;
