use super::claims::Scoped;

/// Whether `subject` holds `required`, either bare or qualified as
/// `{app_id}.{required}`.
pub fn has_scope<S>(subject: &S, required: &str, app_id: &str) -> bool
where
    S: Scoped + ?Sized,
{
    let qualified = format!("{app_id}.{required}");
    subject
        .scopes()
        .iter()
        .any(|scope| scope == required || *scope == qualified)
}

/// Logical OR of [`has_scope`] over `required`. An empty list is never
/// satisfied.
pub fn has_any_scope<S, R>(subject: &S, required: &[R], app_id: &str) -> bool
where
    S: Scoped + ?Sized,
    R: AsRef<str>,
{
    required
        .iter()
        .any(|scope| has_scope(subject, scope.as_ref(), app_id))
}
