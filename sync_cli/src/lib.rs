#![allow(clippy::module_name_repetitions)]

pub mod fitbit_sync;
pub mod fitbit_sync_opts;
