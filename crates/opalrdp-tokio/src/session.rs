//! The consumer-facing session: connect, run the read loop, send input.
//!
//! One logical task owns the session: the read loop decodes and dispatches
//! synchronously on its task, and every writer goes through a single lock
//! released only between whole PDUs, so concurrent senders interleave
//! per-PDU, never mid-PDU.

use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Duration;

use opalrdp_connector::{ClientConnector, Config, ConnectionResult};
use opalrdp_core::{encode_vec, WriteBuf};
use opalrdp_dvc::{DrdynvcClient, DvcHandler};
use opalrdp_input::{Database, KeyModifiers, MouseButton, MousePosition, Scancode};
use opalrdp_nla::{CredsspSequence, NlaCredentials};
use opalrdp_pdu::input::fast_path::FastPathInput;
use opalrdp_pdu::mcs::DisconnectReason;
use opalrdp_session::{ActiveStage, ActiveStageOutput, BitmapProcessor};
use opalrdp_svc::cliprdr::{ClipboardHandler, CliprdrChannel};
use opalrdp_svc::rdpdr::{DeviceHandler, RdpdrChannel};
use tokio::io::{AsyncRead, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::connect::{connect_begin, connect_finalize, perform_credssp};
use crate::framed::Framed;
use crate::{ClientError, ClientErrorExt as _, ClientResult};

/// Transport-level options; everything protocol-level lives in [`Config`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub config: Config,
}

impl SessionOptions {
    pub fn new(host: impl Into<String>, config: Config) -> Self {
        Self {
            host: host.into(),
            port: 3389,
            connect_timeout: Duration::from_secs(5),
            read_timeout: None,
            write_timeout: None,
            config,
        }
    }
}

/// Builds a [`Session`]: handler registration happens here, before the
/// channels are advertised to the server.
pub struct SessionBuilder {
    options: SessionOptions,
    drdynvc: DrdynvcClient,
    clipboard_handler: Option<Box<dyn ClipboardHandler>>,
    device_handler: Option<Box<dyn DeviceHandler>>,
    cancellation_token: CancellationToken,
}

impl SessionBuilder {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            drdynvc: DrdynvcClient::new(),
            clipboard_handler: None,
            device_handler: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Registers a handler for dynamic channels created under `name`.
    pub fn register_dvc_handler(&mut self, name: impl Into<String>, handler: Box<dyn DvcHandler>) -> &mut Self {
        self.drdynvc.register_handler(name, handler);
        self
    }

    /// Registers the clipboard channel handler; the `cliprdr` channel is
    /// advertised only when one is present.
    pub fn register_clipboard_handler(&mut self, handler: Box<dyn ClipboardHandler>) -> &mut Self {
        self.clipboard_handler = Some(handler);
        self
    }

    /// Registers the device redirection handler; the `rdpdr` channel is
    /// advertised only when one is present.
    pub fn register_device_handler(&mut self, handler: Box<dyn DeviceHandler>) -> &mut Self {
        self.device_handler = Some(handler);
        self
    }

    /// Token cancelling both the connect and the session run loop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Performs the whole connection sequence and returns an active session.
    pub async fn connect(self) -> ClientResult<Session> {
        let cancel = self.cancellation_token.clone();

        tokio::select! {
            () = cancel.cancelled() => Err(ClientError::cancelled("connect")),
            result = self.connect_inner() => result,
        }
    }

    async fn connect_inner(self) -> ClientResult<Session> {
        let SessionBuilder {
            options,
            drdynvc,
            clipboard_handler,
            device_handler,
            cancellation_token,
        } = self;

        let address = format!("{}:{}", options.host, options.port);

        info!(%address, "Connecting");

        let stream = tokio::time::timeout(options.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| ClientError::new("connect", crate::ClientErrorKind::Timeout))?
            .map_err(ClientError::io)?;

        stream.set_nodelay(true).map_err(ClientError::io)?;

        let mut connector = ClientConnector::new(options.config.clone());

        // Channel registration order matters: the ids assigned by the server
        // are zipped with the advertised channel list.
        if let Some(handler) = clipboard_handler {
            connector.attach_static_channel(CliprdrChannel::new(handler));
        }
        if let Some(handler) = device_handler {
            connector.attach_static_channel(RdpdrChannel::new(handler));
        }
        connector.attach_static_channel(drdynvc);

        // Phase 1: negotiation over the raw TCP stream.
        let mut framed = Framed::new(stream);
        connect_begin(&mut framed, &mut connector).await.map_err(ClientError::connector)?;

        // TLS upgrade; any certificate is accepted, its DER is the channel
        // binding material.
        let (stream, leftover) = framed.into_inner();
        debug_assert!(leftover.is_empty(), "no leftover bytes expected before the TLS upgrade");

        let (tls_stream, peer_certificate) = opalrdp_tls::upgrade(stream, &options.host)
            .await
            .map_err(ClientError::io)?;

        connector.mark_security_upgrade_as_done();

        let mut framed = Framed::new(tls_stream);

        // NLA, when HYBRID was selected.
        if connector.should_perform_credssp() {
            let mut credssp = CredsspSequence::new(
                NlaCredentials {
                    username: options.config.credentials.username.clone(),
                    password: options.config.credentials.password.clone(),
                    domain: options.config.credentials.domain.clone(),
                },
                &peer_certificate.der,
                peer_certificate.public_key.clone(),
                options.config.client_name.clone(),
            );

            perform_credssp(&mut framed, &mut credssp)
                .await
                .map_err(ClientError::connector)?;

            connector.mark_credssp_as_done();
        }

        // Phases 2-8 up to the active stage.
        let connection_result = connect_finalize(&mut framed, connector)
            .await
            .map_err(ClientError::connector)?;

        debug!(?connection_result, "Connection sequence finished");

        Ok(Session::new(framed, connection_result, options, cancellation_token))
    }
}

type Transport = opalrdp_tls::TlsStream<TcpStream>;

/// An active RDP session.
///
/// [`Session::run`] must be driven on one task; the `send_*` methods may be
/// called from any task and serialize on the writer lock.
pub struct Session {
    reader: SyncMutex<Option<Framed<ReadHalf<Transport>>>>,
    writer: Arc<Mutex<WriteHalf<Transport>>>,
    active_stage: Arc<SyncMutex<ActiveStage>>,
    input: Arc<SyncMutex<Database>>,
    cancellation_token: CancellationToken,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl Session {
    fn new(
        framed: Framed<Transport>,
        connection_result: ConnectionResult,
        options: SessionOptions,
        cancellation_token: CancellationToken,
    ) -> Self {
        let bitmap_cache_entries = options.config.bitmap_cache_entries;

        let (stream, leftover) = framed.into_inner();
        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            reader: SyncMutex::new(Some(Framed::new_with_leftover(read_half, leftover))),
            writer: Arc::new(Mutex::new(write_half)),
            active_stage: Arc::new(SyncMutex::new(ActiveStage::new(connection_result, bitmap_cache_entries))),
            input: Arc::new(SyncMutex::new(Database::new())),
            cancellation_token,
            read_timeout: options.read_timeout,
            write_timeout: options.write_timeout,
        }
    }

    /// Token cancelling the run loop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Requests cooperative termination of [`Session::run`].
    pub fn shutdown(&self) {
        self.cancellation_token.cancel();
    }

    /// Snapshot of the bitmap cache statistics, one entry per tier.
    pub fn bitmap_cache_stats(&self) -> Vec<opalrdp_graphics::bitmap_cache::CacheStats> {
        self.active_stage.lock().expect("active stage lock").bitmap_cache_stats()
    }

    /// Runs the read loop until the server disconnects, a fatal error occurs
    /// or the cancellation token fires.
    ///
    /// `processor` is invoked on this task for every decoded display region
    /// and must not block on session progress.
    pub async fn run(&self, processor: &mut dyn BitmapProcessor) -> ClientResult<DisconnectReason> {
        let mut framed = self
            .reader
            .lock()
            .expect("reader lock")
            .take()
            .ok_or_else(|| ClientError::general("session is already running"))?;

        loop {
            let frame = tokio::select! {
                () = self.cancellation_token.cancelled() => {
                    debug!("Session cancelled");
                    return Err(ClientError::cancelled("run"));
                }
                frame = read_frame(&mut framed, self.read_timeout) => frame?,
            };

            let (action, frame) = frame;

            let outputs = {
                let mut active_stage = self.active_stage.lock().expect("active stage lock");
                active_stage
                    .process(&mut *processor, action, &frame)
                    .map_err(ClientError::session)?
            };

            for output in outputs {
                match output {
                    ActiveStageOutput::ResponseFrame(frame) => {
                        self.write_frame(&frame).await?;
                    }
                    ActiveStageOutput::Terminate(reason) => {
                        info!(%reason, "Session terminated by the server");
                        return Ok(reason);
                    }
                }
            }
        }
    }

    /// Sends a key event. A press (`down == true`) is a full bracketed
    /// press-and-release around `modifiers`; a release sends the single up
    /// transition. Modifier releases are best-effort: failures are logged
    /// and do not propagate.
    pub async fn send_key(&self, code: Scancode, down: bool, modifiers: KeyModifiers) -> ClientResult<()> {
        let events = {
            let mut input = self.input.lock().expect("input lock");
            if down {
                input.key_press(code, modifiers).into_vec()
            } else {
                vec![input.key(code, false)]
            }
        };

        // The key itself: press + release (or the lone release). Everything
        // after is modifier unwinding.
        let essential = if down { 2 + modifier_count(modifiers) } else { 1 };

        self.send_input_events(&events, essential).await
    }

    /// Types `text`; code points outside the layout are skipped.
    pub async fn send_string(&self, text: &str) -> ClientResult<()> {
        let events = {
            let mut input = self.input.lock().expect("input lock");
            input.string_press(text)
        };

        self.send_input_events(&events, events.len()).await
    }

    pub async fn send_mouse(&self, button: MouseButton, down: bool, x: u16, y: u16) -> ClientResult<()> {
        let event = {
            let mut input = self.input.lock().expect("input lock");
            input.set_mouse_position(MousePosition { x, y });
            input.mouse_button(button, down)
        };

        self.send_input_events(&[event], 1).await
    }

    pub async fn send_mouse_move(&self, x: u16, y: u16) -> ClientResult<()> {
        let event = {
            let mut input = self.input.lock().expect("input lock");
            input.mouse_move(MousePosition { x, y })
        };

        self.send_input_events(&[event], 1).await
    }

    /// Sends a vertical wheel rotation at the given position.
    pub async fn send_wheel(&self, delta: i16, x: u16, y: u16) -> ClientResult<()> {
        let event = {
            let mut input = self.input.lock().expect("input lock");
            input.set_mouse_position(MousePosition { x, y });
            input.wheel(delta, true)
        };

        self.send_input_events(&[event], 1).await
    }

    /// Sends application data on the named dynamic channel.
    pub async fn send_dvc_data(&self, channel_name: &str, data: &[u8]) -> ClientResult<()> {
        let mut buf = WriteBuf::new();

        {
            let mut active_stage = self.active_stage.lock().expect("active stage lock");
            active_stage
                .encode_dynamic(&mut buf, channel_name, data)
                .map_err(ClientError::session)?;
        }

        self.write_frame(buf.filled()).await
    }

    /// Each input event goes out as its own FastPath PDU with one event.
    /// Events past `essential` (the bracketing releases) are best-effort.
    async fn send_input_events(
        &self,
        events: &[opalrdp_pdu::input::fast_path::FastPathInputEvent],
        essential: usize,
    ) -> ClientResult<()> {
        for (i, event) in events.iter().enumerate() {
            let pdu = FastPathInput(vec![event.clone()]);
            let frame = encode_vec(&pdu).map_err(ClientError::encode)?;

            match self.write_frame(&frame).await {
                Ok(()) => {}
                Err(e) if i >= essential => {
                    warn!(error = %e.report(), "Best-effort input release failed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn write_frame(&self, frame: &[u8]) -> ClientResult<()> {
        use tokio::io::AsyncWriteExt as _;

        let mut writer = self.writer.lock().await;

        let write = async {
            writer.write_all(frame).await?;
            writer.flush().await
        };

        match self.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, write)
                .await
                .map_err(|_| ClientError::new("write", crate::ClientErrorKind::Timeout))?
                .map_err(ClientError::io),
            None => write.await.map_err(ClientError::io),
        }
    }
}

fn modifier_count(modifiers: KeyModifiers) -> usize {
    usize::from(modifiers.shift) + usize::from(modifiers.ctrl) + usize::from(modifiers.alt) + usize::from(modifiers.meta)
}

async fn read_frame<S>(
    framed: &mut Framed<S>,
    read_timeout: Option<Duration>,
) -> ClientResult<(opalrdp_pdu::Action, bytes::BytesMut)>
where
    S: AsyncRead + Unpin,
{
    match read_timeout {
        Some(timeout) => tokio::time::timeout(timeout, framed.read_pdu())
            .await
            .map_err(|_| ClientError::new("read", crate::ClientErrorKind::Timeout))?
            .map_err(ClientError::io),
        None => framed.read_pdu().await.map_err(ClientError::io),
    }
}

