//! Packer facade and configuration.
//!
//! The [`PackerBuilder`] provides a fluent API for configuring the engine
//! launch and UV channel handling. The [`Packer`] runs at most one
//! [`Session`] at a time and hands out [`SessionHandle`]s for it.
//!
//! # Example
//!
//! ```ignore
//! use uvpack_bridge::{EditableMesh, PackOptions, Packer};
//!
//! let mut packer = Packer::builder()
//!     .engine_path("/opt/uv-packer/uv-packer-engine")
//!     .create_uv_channel(true)
//!     .build();
//!
//! let handle = packer.begin_pack(&PackOptions::default(), meshes)?;
//! loop {
//!     let status = packer.poll_session(handle)?;
//!     if status.state.is_terminal() {
//!         break;
//!     }
//!     // redraw, handle input, ...
//! }
//! let meshes = packer.finish_session(handle)?;
//! ```

use std::ffi::OsString;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::{PackError, Result, StartError};
use crate::exchange::Severity;
use crate::mesh::{ensure_uv_channel, remove_uv_channel, split_unique, HostMesh};
use crate::options::PackOptions;
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::session::{Session, SessionStatus, StatusSink, TracingSink, ALERT_TITLE};
use crate::transport::EngineCommand;

/// Environment variable overriding the engine executable.
pub const ENGINE_ENV_VAR: &str = "UVPACK_ENGINE";

/// Engine executable name looked up next to the current executable.
pub const DEFAULT_ENGINE_NAME: &str = "uv-packer-engine";

/// Default name of the UV layer results are written to when one is created.
pub const DEFAULT_UV_CHANNEL: &str = "UV-Packer";

/// How long an engine may keep running after its terminal frame.
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Resolve the engine executable: `$UVPACK_ENGINE`, else
/// `uv-packer-engine` beside the running executable.
pub fn default_engine_path() -> PathBuf {
    if let Some(path) = std::env::var_os(ENGINE_ENV_VAR) {
        return PathBuf::from(path);
    }

    let file_name = format!("{}{}", DEFAULT_ENGINE_NAME, std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

/// Configuration for launching sessions.
#[derive(Debug, Clone)]
pub struct PackerConfig {
    /// Engine executable.
    pub engine_path: PathBuf,
    /// Extra arguments passed to the engine.
    pub engine_args: Vec<OsString>,
    /// Largest response frame accepted.
    pub max_frame_size: u32,
    /// UV layer created and activated when `create_uv_channel` is set.
    pub uv_channel: String,
    /// Write results to a dedicated UV layer instead of the active one.
    pub create_uv_channel: bool,
    /// Runtime the exchange task runs on. Defaults to the current one.
    pub runtime: Option<Handle>,
    /// Time allowed for the engine to exit after a clean exchange before it
    /// is killed.
    pub exit_grace: Duration,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            engine_path: default_engine_path(),
            engine_args: Vec::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            uv_channel: DEFAULT_UV_CHANNEL.to_string(),
            create_uv_channel: false,
            runtime: None,
            exit_grace: DEFAULT_EXIT_GRACE,
        }
    }
}

impl PackerConfig {
    pub fn engine_command(&self) -> EngineCommand {
        EngineCommand::new(&self.engine_path).args(&self.engine_args)
    }

    /// The configured runtime, or the one we're running inside.
    pub fn runtime(&self) -> Result<Handle> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| {
                PackError::Configuration(
                    "No tokio runtime configured or running".to_string(),
                )
            }),
        }
    }
}

/// Builder for configuring and creating a [`Packer`].
pub struct PackerBuilder<M> {
    config: PackerConfig,
    sink: Arc<dyn StatusSink>,
    _mesh: PhantomData<fn() -> M>,
}

impl<M: HostMesh> PackerBuilder<M> {
    pub fn new() -> Self {
        Self {
            config: PackerConfig::default(),
            sink: Arc::new(TracingSink),
            _mesh: PhantomData,
        }
    }

    /// Set the engine executable.
    ///
    /// Default: `$UVPACK_ENGINE`, else `uv-packer-engine` next to the
    /// current executable.
    pub fn engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.engine_path = path.into();
        self
    }

    /// Append an engine argument.
    pub fn engine_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.config.engine_args.push(arg.into());
        self
    }

    /// Append several engine arguments.
    pub fn engine_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.config.engine_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the largest accepted response frame.
    ///
    /// Default: 1 GiB
    pub fn max_frame_size(mut self, bytes: u32) -> Self {
        self.config.max_frame_size = bytes;
        self
    }

    /// Set the UV layer name used with [`create_uv_channel`](Self::create_uv_channel).
    ///
    /// Default: `UV-Packer`
    pub fn uv_channel(mut self, name: impl Into<String>) -> Self {
        self.config.uv_channel = name.into();
        self
    }

    /// Create and activate the UV layer on every mesh before packing.
    ///
    /// Default: false
    pub fn create_uv_channel(mut self, create: bool) -> Self {
        self.config.create_uv_channel = create;
        self
    }

    /// Run exchanges on this runtime instead of the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.config.runtime = Some(handle);
        self
    }

    /// How long the engine may linger after answering before it is killed.
    ///
    /// Default: 2 seconds
    pub fn exit_grace(mut self, grace: Duration) -> Self {
        self.config.exit_grace = grace;
        self
    }

    /// Where status messages and alerts go.
    ///
    /// Default: [`TracingSink`]
    pub fn sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> Packer<M> {
        Packer {
            config: self.config,
            sink: self.sink,
            next_id: 1,
            current: None,
        }
    }
}

impl<M: HostMesh> Default for PackerBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque reference to a session started by [`Packer::begin_pack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// The session a [`Packer`] is holding, plus the objects left out of it
/// because their mesh data was already submitted.
struct Current<M> {
    handle: SessionHandle,
    session: Session<M>,
    shared: Vec<M>,
}

/// Starts and tracks pack sessions, one at a time.
pub struct Packer<M> {
    config: PackerConfig,
    sink: Arc<dyn StatusSink>,
    next_id: u64,
    current: Option<Current<M>>,
}

impl<M: HostMesh> Packer<M> {
    pub fn builder() -> PackerBuilder<M> {
        PackerBuilder::new()
    }

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    /// Start packing `meshes` with `options`.
    ///
    /// Objects sharing mesh data are packed once; the others ride along and
    /// come back from [`finish_session`](Self::finish_session) after the
    /// packed ones. Configuration errors are reported before any process is
    /// spawned, and the UV channel is only created once the engine is up.
    ///
    /// Fails with [`PackError::SessionInProgress`] while another session is
    /// running and with [`PackError::SessionNotCollected`] while a finished
    /// one still holds its meshes. Every failure returns the meshes.
    pub fn begin_pack(
        &mut self,
        options: &PackOptions,
        meshes: Vec<M>,
    ) -> std::result::Result<SessionHandle, StartError<M>> {
        if let Some(current) = &self.current {
            let error = if current.session.is_terminal() {
                PackError::SessionNotCollected(current.handle.0)
            } else {
                PackError::SessionInProgress
            };
            return Err(StartError::new(error, meshes));
        }

        let (unique, shared) = split_unique(meshes);
        let mut session = match Session::start(unique, options, &self.config, self.sink.clone()) {
            Ok(session) => session,
            Err(err) => {
                let (error, mut meshes) = err.into_parts();
                let message = error.to_string();
                self.sink.report(Severity::Error, &message);
                if error.wants_alert() || matches!(error, PackError::Configuration(_)) {
                    self.sink.alert(ALERT_TITLE, &message);
                }
                meshes.extend(shared);
                return Err(StartError::new(error, meshes));
            }
        };

        if self.config.create_uv_channel {
            ensure_uv_channel(session.meshes_mut(), &self.config.uv_channel);
        }

        let handle = SessionHandle(self.next_id);
        self.next_id += 1;
        tracing::debug!("Session {} started", handle.0);
        self.current = Some(Current {
            handle,
            session,
            shared,
        });
        Ok(handle)
    }

    /// Drain the session's events and return its status.
    pub fn poll_session(&mut self, handle: SessionHandle) -> Result<SessionStatus> {
        Ok(self.session_mut(handle)?.poll())
    }

    /// Cancel the session. Immediate; a no-op if it already ended.
    pub fn cancel_session(&mut self, handle: SessionHandle) -> Result<()> {
        self.session_mut(handle)?.cancel();
        Ok(())
    }

    pub fn session(&self, handle: SessionHandle) -> Result<&Session<M>> {
        match &self.current {
            Some(current) if current.handle == handle => Ok(&current.session),
            _ => Err(PackError::UnknownSession(handle.0)),
        }
    }

    /// Release the session and return every mesh handed to `begin_pack`:
    /// the packed ones in submission order, then those that shared their
    /// mesh data. Cancels the session if it is still running.
    pub fn finish_session(&mut self, handle: SessionHandle) -> Result<Vec<M>> {
        match self.current.take() {
            Some(current) if current.handle == handle => {
                let mut meshes = current.session.into_meshes();
                meshes.extend(current.shared);
                Ok(meshes)
            }
            other => {
                self.current = other;
                Err(PackError::UnknownSession(handle.0))
            }
        }
    }

    /// Remove the configured UV channel from `meshes`.
    pub fn remove_uv_channel(&self, meshes: &mut [M]) -> usize {
        remove_uv_channel(meshes, &self.config.uv_channel)
    }

    fn session_mut(&mut self, handle: SessionHandle) -> Result<&mut Session<M>> {
        match &mut self.current {
            Some(current) if current.handle == handle => Ok(&mut current.session),
            _ => Err(PackError::UnknownSession(handle.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::quad;
    use crate::mesh::EditableMesh;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<(Severity, String)>>,
        alerts: Mutex<Vec<String>>,
    }

    impl StatusSink for RecordingSink {
        fn report(&self, severity: Severity, message: &str) {
            self.reports.lock().unwrap().push((severity, message.to_string()));
        }

        fn alert(&self, _title: &str, message: &str) {
            self.alerts.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_builder_configuration() {
        let packer: Packer<EditableMesh> = Packer::builder()
            .engine_path("/opt/engine")
            .engine_arg("--mode")
            .engine_args(["identity"])
            .max_frame_size(4096)
            .uv_channel("Packed")
            .create_uv_channel(true)
            .build();

        let config = packer.config();
        assert_eq!(config.engine_path, PathBuf::from("/opt/engine"));
        assert_eq!(config.engine_args.len(), 2);
        assert_eq!(config.max_frame_size, 4096);
        assert_eq!(config.uv_channel, "Packed");
        assert!(config.create_uv_channel);
    }

    #[test]
    fn test_config_defaults() {
        let config = PackerConfig::default();
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.uv_channel, DEFAULT_UV_CHANNEL);
        assert!(!config.create_uv_channel);
        assert!(config.runtime.is_none());
    }

    #[test]
    fn test_runtime_required_outside_tokio() {
        let config = PackerConfig::default();
        assert!(matches!(config.runtime(), Err(PackError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_zero_objects_rejected_before_spawn() {
        let sink = Arc::new(RecordingSink::default());
        let mut packer: Packer<EditableMesh> = Packer::builder()
            .engine_path("/nonexistent/engine")
            .sink(sink.clone())
            .build();

        // A spawn attempt would surface as ProcessSpawn instead.
        let err = packer
            .begin_pack(&PackOptions::default(), Vec::new())
            .unwrap_err();
        assert!(matches!(err.error, PackError::Configuration(_)));
        assert_eq!(err.to_string(), "Configuration error: No objects to pack.");

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports[0].1, "Preparing geometry");
        assert_eq!(reports.last().map(|r| r.0), Some(Severity::Error));
        assert_eq!(sink.alerts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_engine_is_spawn_error() {
        let mut packer = Packer::builder()
            .engine_path("/nonexistent/engine")
            .build();

        let err = packer
            .begin_pack(&PackOptions::default(), vec![quad("A", 1)])
            .unwrap_err();
        assert!(matches!(err.error, PackError::ProcessSpawn { .. }));
    }

    #[tokio::test]
    async fn test_failed_start_returns_meshes_untouched() {
        let mut packer: Packer<EditableMesh> = Packer::builder()
            .engine_path("/nonexistent/engine")
            .create_uv_channel(true)
            .uv_channel("Packed")
            .build();
        let meshes = vec![quad("A", 1), quad("B", 2), quad("A.001", 1)];
        let before = meshes.clone();

        let (error, returned) = packer
            .begin_pack(&PackOptions::default(), meshes)
            .unwrap_err()
            .into_parts();
        assert!(matches!(error, PackError::ProcessSpawn { .. }));

        // Packed objects first, then the one sharing mesh data.
        assert_eq!(returned, before);
        assert!(returned.iter().all(|m| !m.has_uv_layer("Packed")));
        assert!(packer.current.is_none());
    }

    #[test]
    fn test_exit_grace_setting() {
        let packer: Packer<EditableMesh> = Packer::builder()
            .exit_grace(Duration::from_millis(250))
            .build();
        assert_eq!(packer.config().exit_grace, Duration::from_millis(250));
        assert_eq!(PackerConfig::default().exit_grace, DEFAULT_EXIT_GRACE);
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let mut packer: Packer<EditableMesh> = Packer::builder().build();
        let bogus = SessionHandle(99);

        assert!(matches!(
            packer.poll_session(bogus),
            Err(PackError::UnknownSession(99))
        ));
        assert!(matches!(
            packer.cancel_session(bogus),
            Err(PackError::UnknownSession(99))
        ));
        assert!(packer.finish_session(bogus).is_err());
    }

    #[test]
    fn test_remove_configured_channel() {
        let packer: Packer<EditableMesh> = Packer::builder().uv_channel("Packed").build();
        let mut meshes = vec![quad("A", 1), quad("B", 2)];
        ensure_uv_channel(&mut meshes[..1], "Packed");

        assert_eq!(packer.remove_uv_channel(&mut meshes), 1);
        assert!(!meshes[0].has_uv_layer("Packed"));
    }
}
