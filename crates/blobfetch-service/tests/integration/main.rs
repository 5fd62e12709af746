mod blob;
mod definitions;
mod utils;
