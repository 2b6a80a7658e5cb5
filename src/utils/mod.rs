pub mod control_server;
pub mod slug;
