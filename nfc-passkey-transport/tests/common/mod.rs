//! Shared test utilities

#![allow(dead_code)]

use nfc_passkey_transport::{Channel, Error, Result};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Channel that answers with canned responses and records what it was sent
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    responses: Arc<Mutex<VecDeque<Vec<u8>>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    timeouts: Arc<Mutex<Vec<Duration>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedChannel {
    pub fn new(responses: &[&str]) -> Self {
        let channel = Self::default();
        {
            let mut queue = channel.responses.lock().unwrap();
            for resp in responses {
                queue.push_back(hex::decode(resp).unwrap());
            }
        }
        channel
    }

    pub fn sent_hex(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(hex::encode_upper)
            .collect()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Channel for ScriptedChannel {
    fn send(&mut self, apdu: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.sent.lock().unwrap().push(apdu.to_vec());
        self.timeouts.lock().unwrap().push(timeout);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::IoError("script exhausted".to_string()))
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
