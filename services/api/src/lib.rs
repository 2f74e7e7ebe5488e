mod cli;
mod demo;
mod infra;
mod routes;
mod server;

pub use cli::run;
