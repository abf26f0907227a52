#![cfg_attr(doc, doc = include_str!("../README.md"))]

mod client;
mod complete_data;
pub mod pdu;

pub use client::{DrdynvcClient, DvcChannelState, DvcHandler, NoopDvcHandler};
