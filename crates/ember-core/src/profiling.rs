//! Profiling utilities based on the `puffin` crate.
//!
//! With the `profiling` feature disabled the scope macros expand to nothing, so
//! call sites never need their own `cfg` guards.

#[cfg(feature = "profiling")]
mod enabled {
    use std::sync::OnceLock;

    pub use puffin::{GlobalProfiler, profile_function, profile_scope};

    /// Profiling backend options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ProfilingBackend {
        /// Send profiling data to puffin_viewer via HTTP.
        PuffinHttp,
    }

    static PROFILING_SERVER: OnceLock<puffin_http::Server> = OnceLock::new();

    /// Default address of the puffin HTTP server.
    pub const PUFFIN_ADDR: &str = "0.0.0.0:8585";

    /// Initialize profiling with the specified backend.
    ///
    /// # Example
    /// ```no_run
    /// use ember_core::profiling::{init_profiling, ProfilingBackend};
    ///
    /// init_profiling(ProfilingBackend::PuffinHttp);
    /// ```
    pub fn init_profiling(backend: ProfilingBackend) {
        match backend {
            ProfilingBackend::PuffinHttp => {
                puffin::set_scopes_on(true);

                match puffin_http::Server::new(PUFFIN_ADDR) {
                    Ok(server) => {
                        tracing::info!("Puffin profiler server started on http://{PUFFIN_ADDR}");
                        let _ = PROFILING_SERVER.set(server);
                    }
                    Err(e) => {
                        tracing::error!("Failed to start puffin server: {}", e);
                    }
                }
            }
        }
    }

    /// Mark a frame boundary for the profiler.
    #[inline]
    pub fn new_frame() {
        puffin::GlobalProfiler::lock().new_frame();
    }
}

#[cfg(feature = "profiling")]
pub use enabled::*;

#[cfg(not(feature = "profiling"))]
mod disabled {
    #[macro_export]
    macro_rules! profile_function {
        ($($arg:tt)*) => {};
    }

    #[macro_export]
    macro_rules! profile_scope {
        ($($arg:tt)*) => {};
    }

    pub use crate::{profile_function, profile_scope};

    #[inline]
    pub fn new_frame() {}
}

#[cfg(not(feature = "profiling"))]
pub use disabled::*;
