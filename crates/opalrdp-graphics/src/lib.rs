#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod bitmap_cache;
pub mod offscreen;
pub mod rdp6;
pub mod rle;
