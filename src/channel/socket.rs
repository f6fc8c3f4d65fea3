use super::{Channel, ChannelError, ChannelName, MAX_FRAME_LEN};
use bytes::{Buf, Bytes, BytesMut};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// Length-prefixed frames over a unix socket owned by the worker.
///
/// The worker binds `<dir>/<shared>-<index>.sock` and serves exactly one controller
/// connection at a time. Frames are a big-endian `u32` length followed by the payload.
pub(crate) struct SocketChannel {
    runtime: tokio::runtime::Runtime,
    listener: UnixListener,
    stream: Option<UnixStream>,
    buf: BytesMut,
    path: PathBuf,
}

impl SocketChannel {
    pub fn bind(dir: &Path, name: &ChannelName) -> Result<Self, ChannelError> {
        let startup = |source| ChannelError::Startup {
            name: name.to_string(),
            source,
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(startup)?;

        std::fs::create_dir_all(dir).map_err(startup)?;
        let path = dir.join(format!("{name}.sock"));
        // Left behind by a worker with the same name that did not shut down cleanly.
        if path.exists() {
            std::fs::remove_file(&path).map_err(startup)?;
        }
        let listener = {
            let _guard = runtime.enter();
            UnixListener::bind(&path).map_err(startup)?
        };
        tracing::info!(path = %path.display(), "channel listening");

        Ok(Self {
            runtime,
            listener,
            stream: None,
            buf: BytesMut::with_capacity(8 * 1024),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Split one complete frame off the front of `buf`, if there is one.
fn split_frame(buf: &mut BytesMut) -> Result<Option<Bytes>, ChannelError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ChannelError::FrameTooLarge(len));
    }
    if buf.len() < 4 + len {
        return Ok(None);
    }
    buf.advance(4);
    Ok(Some(buf.split_to(len).freeze()))
}

impl Channel for SocketChannel {
    fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        if message.len() > MAX_FRAME_LEN {
            return Err(ChannelError::FrameTooLarge(message.len()));
        }
        let Self {
            runtime, stream, ..
        } = self;
        let Some(s) = stream.as_mut() else {
            return Err(ChannelError::NotConnected);
        };
        let header = (message.len() as u32).to_be_bytes();
        let res = runtime.block_on(async {
            s.write_all(&header).await?;
            s.write_all(message).await?;
            s.flush().await
        });
        if let Err(e) = res {
            *stream = None;
            return Err(e.into());
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>, ChannelError> {
        let Self {
            runtime,
            listener,
            stream,
            buf,
            ..
        } = self;

        runtime.block_on(async {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                match split_frame(buf) {
                    Ok(Some(frame)) => return Ok(Some(frame)),
                    Ok(None) => {}
                    Err(e) => {
                        // The stream is out of sync; start over with the next connection.
                        *stream = None;
                        buf.clear();
                        return Err(e);
                    }
                }

                let Some(s) = stream.as_mut() else {
                    match tokio::time::timeout_at(deadline, listener.accept()).await {
                        Ok(Ok((s, _))) => {
                            tracing::info!("controller connected");
                            *stream = Some(s);
                            continue;
                        }
                        Ok(Err(e)) => return Err(e.into()),
                        Err(_) => return Ok(None),
                    }
                };

                match tokio::time::timeout_at(deadline, s.read_buf(buf)).await {
                    Ok(Ok(0)) => {
                        *stream = None;
                        buf.clear();
                        return Err(ChannelError::Closed);
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        *stream = None;
                        buf.clear();
                        return Err(e.into());
                    }
                    Err(_) => return Ok(None),
                }
            }
        })
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "channel removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove channel")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    fn name() -> ChannelName {
        ChannelName {
            shared: "test-ipc".into(),
            index: 2,
        }
    }

    #[test]
    fn exchanges_frames_with_controller() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = SocketChannel::bind(dir.path(), &name()).unwrap();
        assert!(channel.path().ends_with("test-ipc-2.sock"));

        let mut controller = std::os::unix::net::UnixStream::connect(channel.path()).unwrap();
        let mut two = frame(br#"{"id":1}"#);
        two.extend(frame(br#"{"id":2}"#));
        controller.write_all(&two).unwrap();

        let first = channel.receive(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(&first[..], br#"{"id":1}"#);
        // Second frame is already buffered, so a zero-timeout drain must see it.
        let second = channel.receive(Duration::ZERO).unwrap().unwrap();
        assert_eq!(&second[..], br#"{"id":2}"#);
        assert!(channel.receive(Duration::from_millis(20)).unwrap().is_none());

        channel.send(b"reply").unwrap();
        let mut got = [0u8; 9];
        controller.read_exact(&mut got).unwrap();
        assert_eq!(&got[..], &frame(b"reply")[..]);
    }

    #[test]
    fn partial_frame_survives_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = SocketChannel::bind(dir.path(), &name()).unwrap();
        let mut controller = std::os::unix::net::UnixStream::connect(channel.path()).unwrap();

        let full = frame(br#"{"perform":"stop"}"#);
        controller.write_all(&full[..6]).unwrap();
        assert!(channel.receive(Duration::from_millis(50)).unwrap().is_none());
        controller.write_all(&full[6..]).unwrap();
        let msg = channel.receive(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(&msg[..], br#"{"perform":"stop"}"#);
    }

    #[test]
    fn send_without_controller_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = SocketChannel::bind(dir.path(), &name()).unwrap();
        let err = channel.send(b"x").unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
        assert!(!err.is_fatal());
    }

    #[test]
    fn drop_removes_socket() {
        let dir = tempfile::tempdir().unwrap();
        let channel = SocketChannel::bind(dir.path(), &name()).unwrap();
        let path = channel.path().to_path_buf();
        assert!(path.exists());
        drop(channel);
        assert!(!path.exists());
    }
}
