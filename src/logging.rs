//! Relation log macro.
//!
//! Every registry and reconcile log about a relation carries `event` and
//! `relation`, then `source` and the registry `revision` when known. The
//! revision is recorded as a number so log lines can be ordered against
//! status transitions; extra fields use their `Display` form.

/// Log an event for a relation, optionally scoped to a source and a registry
/// revision, plus any extra fields.
#[macro_export]
macro_rules! relation_event {
    ($level:ident, $target:expr, $event:expr, relation = $relation:expr, source = $source:expr, revision = $revision:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            target = $target,
            event = $event,
            relation = $relation,
            source = $source,
            revision = $revision,
            $($field = %$value,)*
        )
    };
    ($level:ident, $target:expr, $event:expr, relation = $relation:expr, source = $source:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            target = $target,
            event = $event,
            relation = $relation,
            source = $source,
            $($field = %$value,)*
        )
    };
    ($level:ident, $target:expr, $event:expr, relation = $relation:expr, revision = $revision:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            target = $target,
            event = $event,
            relation = $relation,
            revision = $revision,
            $($field = %$value,)*
        )
    };
    ($level:ident, $target:expr, $event:expr, relation = $relation:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            target = $target,
            event = $event,
            relation = $relation,
            $($field = %$value,)*
        )
    };
}
