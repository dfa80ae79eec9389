use std::ops::Range;

pub type Span = Range<usize>;

// Span covering both inputs, used when a node is assembled from several tokens.
pub fn join(start: &Span, end: &Span) -> Span {
    start.start.min(end.start)..start.end.max(end.end)
}
