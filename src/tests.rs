mod mock;

mod config;
mod sender;
