pub mod record;
pub mod format;
pub mod sink;
pub mod layer;

pub mod client;
pub mod quickwit_sink;
pub mod index_config;
pub mod storage;

pub mod config;
pub mod env;
pub mod daily_file;
pub mod processor;
pub mod logger;

pub mod init;
pub mod noop_sink;
