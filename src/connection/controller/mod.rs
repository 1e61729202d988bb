//! Reliability control for a single connection: the receive windows, the RTT
//! estimate, and the [`ReliabilityEngine`](reliability::ReliabilityEngine)
//! that ties them to the unacknowledged-send table.
pub mod reliability;
pub mod rtt;
pub mod window;
