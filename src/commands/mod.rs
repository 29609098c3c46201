pub mod extract;
pub mod inventory;
pub mod reformat;
pub mod status;
pub mod update;
