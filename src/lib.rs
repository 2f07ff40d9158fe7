pub mod audio;
pub mod catalog;
pub mod common;
pub mod configs;
pub mod player;
pub mod protocol;
pub mod rest;
pub mod server;
pub mod voice;
