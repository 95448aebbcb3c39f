//! Driver/driven adapters: everything that talks to the outside world.

pub mod http;
