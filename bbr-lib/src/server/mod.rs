mod server_main;

pub(crate) use server_main::{ExtProcServer, ExtProcServerBuilder};
