use std::io;

/// OS process probing and termination, addressed by PID.
pub trait ProcessControl: Send + Sync {
    /// Zero-effect liveness probe. Never errors: anything other than a
    /// positive answer is "not alive".
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask the process to terminate. Does not wait for it to exit.
    fn terminate(&self, pid: u32) -> io::Result<()>;
}
