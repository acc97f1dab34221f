mod config;
mod paths;
mod support;
