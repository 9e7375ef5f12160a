/// Result of `add-leaf`, modelling the 200/202 distinction explicitly
/// rather than smuggling it through an error value (spec.md §9's
/// "variant/tagged error types" note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 200: the leaf is present in a tree head the log has already signed.
    Persisted,
    /// 202: the log accepted the request but has not yet signed a tree
    /// head containing it. Not an error; the caller should poll.
    Accepted,
}
