pub mod destroy;
pub mod init;
pub mod restore;
pub mod stats;
pub mod status;
pub mod upgrade;
pub mod verify;
