mod admission;
mod checker;
mod config;
mod diehard;
mod time_travel;
