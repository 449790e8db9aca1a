//! Click event values routed to blocks.

/// Pointer-click details forwarded verbatim to the next spawn's
/// environment; never interpreted by the scheduler itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Click {
    pub button: String,
    pub x: String,
    pub y: String,
}

/// One decoded click payload, addressed by block identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub name: String,
    pub instance: String,
    pub click: Click,
}
