pub mod namespace;
pub mod pod_watch;
pub mod port_forward;
pub mod remote_debug;
