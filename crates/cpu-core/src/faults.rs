use parking_lot::Mutex;

use apu::FaultKind;

/// Receives every fault raised by translation. Dispatching the fault is the receiver's business.
pub trait FaultSink: Send + Sync {
    fn fault(&self, kind: FaultKind, subtype: u16, msg: &str);
}

/// Default sink: log and carry on.
#[derive(Debug, Default)]
pub struct LogFaults;

impl FaultSink for LogFaults {
    fn fault(&self, kind: FaultKind, subtype: u16, msg: &str) {
        log::debug!("fault {kind:?} subtype {subtype:#o}: {msg}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord { pub kind: FaultKind, pub subtype: u16, pub msg: String }

/// Keeps every reported fault, in order.
#[derive(Debug, Default)]
pub struct CollectFaults(Mutex<Vec<FaultRecord>>);

impl CollectFaults {
    pub fn take(&self) -> Vec<FaultRecord> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl FaultSink for CollectFaults {
    fn fault(&self, kind: FaultKind, subtype: u16, msg: &str) {
        self.0.lock().push(FaultRecord { kind, subtype, msg: msg.to_string() });
    }
}
