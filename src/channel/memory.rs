use super::{Channel, ChannelError};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

#[derive(Default)]
struct Inner {
    inbox: VecDeque<Bytes>,
    sent: Vec<serde_json::Value>,
    fail_sends: bool,
}

/// Single-threaded in-process channel. Clones share the same queues, so a test can
/// keep one handle as the "controller" while the worker owns another.
#[derive(Clone, Default)]
pub(crate) struct MemoryChannel {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryChannel {
    pub fn push(&self, request: serde_json::Value) {
        self.inner
            .borrow_mut()
            .inbox
            .push_back(Bytes::from(request.to_string()));
    }

    pub fn push_raw(&self, raw: &'static [u8]) {
        self.inner.borrow_mut().inbox.push_back(Bytes::from_static(raw));
    }

    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.inner.borrow().sent.clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.inner.borrow_mut().fail_sends = fail;
    }
}

impl Channel for MemoryChannel {
    fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_sends {
            return Err(ChannelError::NotConnected);
        }
        let value = serde_json::from_slice(message)
            .map_err(|e| ChannelError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        inner.sent.push(value);
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Option<Bytes>, ChannelError> {
        Ok(self.inner.borrow_mut().inbox.pop_front())
    }
}
