use serde::{Deserialize, Serialize};

use crate::types::{Word15, Word18, Word2, Word24};

bitflags::bitflags! {
    /// Access violation subtypes; bit n is ACVn.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AcvFlags: u16 {
        const IRO = 1<<0;    // Illegal ring order
        const OEB = 1<<1;    // Not in execute bracket
        const E_OFF = 1<<2;  // No execute permission
        const ORB = 1<<3;    // Not in read bracket
        const R_OFF = 1<<4;  // No read permission
        const OWB = 1<<5;    // Not in write bracket
        const W_OFF = 1<<6;  // No write permission
        const NO_GA = 1<<7;  // Call limiter
        const OCB = 1<<8;    // Out of call brackets
        const OCALL = 1<<9;  // Outward call
        const BOC = 1<<10;   // Bad outward call
        const INRET = 1<<11; // Inward return
        const CRT = 1<<12;   // Invalid ring crossing
        const RALR = 1<<13;  // Ring alarm
        const AME = 1<<14;   // Associative memory error
        const OOSB = 1<<15;  // Out of segment bounds
    }
}

const ACV_NAMES: [(AcvFlags, &str); 16] = [
    (AcvFlags::IRO, "illegal ring order"),
    (AcvFlags::OEB, "not in execute bracket"),
    (AcvFlags::E_OFF, "no execute permission"),
    (AcvFlags::ORB, "not in read bracket"),
    (AcvFlags::R_OFF, "no read permission"),
    (AcvFlags::OWB, "not in write bracket"),
    (AcvFlags::W_OFF, "no write permission"),
    (AcvFlags::NO_GA, "call limiter fault"),
    (AcvFlags::OCB, "out of call brackets"),
    (AcvFlags::OCALL, "outward call"),
    (AcvFlags::BOC, "bad outward call"),
    (AcvFlags::INRET, "inward return"),
    (AcvFlags::CRT, "invalid ring crossing"),
    (AcvFlags::RALR, "ring alarm"),
    (AcvFlags::AME, "associative memory error"),
    (AcvFlags::OOSB, "out of segment bounds"),
];

impl AcvFlags {
    /// Name of the lowest-numbered subtype present.
    pub fn describe(self) -> &'static str {
        ACV_NAMES.iter().find(|(f, _)| self.contains(*f)).map(|(_, n)| *n).unwrap_or("no violation")
    }
}

/// Which descriptor was found not present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectedKind {
    /// PTW of a paged descriptor segment.
    DescriptorPage,
    Segment,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    AccessViolation,
    /// Directed fault DF0..DF3, selected by the descriptor's fault code.
    Directed(Word2),
    /// Reference to memory that is not configured.
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("access violation ({}) {acv:?} at {segno:05o}:{offset:06o}", .acv.describe())]
    AccessViolation { segno: Word15, offset: Word18, acv: AcvFlags },
    #[error("directed fault DF{code} ({kind:?} not present) at {segno:05o}:{offset:06o}")]
    Directed { segno: Word15, offset: Word18, kind: DirectedKind, code: Word2 },
    #[error("non-existent address {addr:08o}")]
    NonExistentAddress { addr: Word24 },
}

impl Fault {
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::AccessViolation { .. } => FaultKind::AccessViolation,
            Fault::Directed { code, .. } => FaultKind::Directed(*code),
            Fault::NonExistentAddress { .. } => FaultKind::Store,
        }
    }

    /// Fault subtype as reported to the fault subsystem: ACV bits, or the directed kind.
    pub fn subtype(&self) -> u16 {
        match self {
            Fault::AccessViolation { acv, .. } => acv.bits(),
            Fault::Directed { kind, .. } => *kind as u16,
            Fault::NonExistentAddress { .. } => 0,
        }
    }

    pub fn acv(&self) -> AcvFlags {
        match self { Fault::AccessViolation { acv, .. } => *acv, _ => AcvFlags::empty() }
    }
}
