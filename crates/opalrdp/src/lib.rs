#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub use opalrdp_connector as connector;
pub use opalrdp_core as core;
pub use opalrdp_dvc as dvc;
pub use opalrdp_graphics as graphics;
pub use opalrdp_input as input;
pub use opalrdp_nla as nla;
pub use opalrdp_pdu as pdu;
pub use opalrdp_session as session;
pub use opalrdp_svc as svc;
pub use opalrdp_tls as tls;
pub use opalrdp_tokio as tokio;
