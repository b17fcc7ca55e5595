/// Line based framing.
pub mod lines;
