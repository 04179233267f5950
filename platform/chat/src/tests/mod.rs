mod cache;
mod config;
mod gate;
mod hierarchy;
