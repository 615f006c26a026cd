#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Declare a [`GuidelineRule`](crate::GuidelineRule).
///
/// ```ignore
/// guideline! {
///     id: "B5.2",
///     when: Condition::flag(ProcedureFlags::CONVERTED_TO_OPEN),
///     then: Action::override_axis(Axis::Approach, "Open"),
/// }
/// ```
#[macro_export]
macro_rules! guideline {
    (
        id: $id:expr,
        when: $cond:expr,
        then: $action:expr
        $(,)?
    ) => {{
        $crate::GuidelineRule { id: ($id).to_string(), condition: $cond, action: $action }
    }};
}

/// Shorthand for an `emit_query` action.
#[macro_export]
macro_rules! query {
    ($id:expr, $axis:expr, $msg:expr $(,)?) => {
        $crate::Action::EmitQuery { query_id: ($id).to_string(), axis: $axis, message: ($msg).to_string() }
    };
}
