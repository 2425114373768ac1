use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};

use crate::error::AppError;
use crate::tasks::repo_types::{NewTask, StatusFilter, TaskFilter, TaskPatch, TaskPriority, TaskStatus};

fn allowed<T: ToString>(values: impl IntoIterator<Item = T>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds the list predicate from raw query parameters. Empty values count as
/// absent; an unknown status is rejected rather than ignored.
pub fn list_filter(status: Option<&str>, search: Option<&str>) -> Result<TaskFilter, AppError> {
    let status = match status.filter(|s| !s.is_empty()) {
        None => StatusFilter::All,
        Some(raw) => StatusFilter::parse(raw).ok_or_else(|| {
            AppError::validation(format!(
                "Invalid status filter. Must be one of: {}, ALL",
                allowed(TaskStatus::ALL)
            ))
        })?,
    };
    let search = search.filter(|s| !s.is_empty()).map(str::to_owned);
    Ok(TaskFilter { status, search })
}

pub fn new_task(body: &Value) -> Result<NewTask, AppError> {
    let obj = as_object(body)?;
    let title = match obj.get("title") {
        None | Some(Value::Null) => return Err(AppError::validation("Title is required")),
        Some(v) => title(v)?,
    };

    let mut task = NewTask::titled(title);
    if let Some(v) = obj.get("description") {
        task.description = nullable_string("description", v)?;
    }
    if let Some(v) = present(obj, "status") {
        task.status = status(v)?;
    }
    if let Some(v) = present(obj, "priority") {
        task.priority = priority(v)?;
    }
    if let Some(v) = obj.get("dueDate") {
        task.due_date = nullable_due_date(v)?;
    }
    Ok(task)
}

pub fn task_patch(body: &Value) -> Result<TaskPatch, AppError> {
    let obj = as_object(body)?;
    let mut patch = TaskPatch::default();

    if let Some(v) = obj.get("title") {
        patch.title = Some(title(v)?);
    }
    if let Some(v) = obj.get("description") {
        patch.description = Some(nullable_string("description", v)?);
    }
    if let Some(v) = obj.get("status") {
        patch.status = Some(status(v)?);
    }
    if let Some(v) = obj.get("priority") {
        patch.priority = Some(priority(v)?);
    }
    if let Some(v) = obj.get("dueDate") {
        patch.due_date = Some(nullable_due_date(v)?);
    }
    Ok(patch)
}

fn as_object(body: &Value) -> Result<&Map<String, Value>, AppError> {
    body.as_object()
        .ok_or_else(|| AppError::validation("Request body must be a JSON object"))
}

// A null status/priority on create means "use the default".
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn title(v: &Value) -> Result<String, AppError> {
    let s = v
        .as_str()
        .ok_or_else(|| AppError::validation("Title must be a string"))?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("Title is required"));
    }
    Ok(trimmed.to_owned())
}

fn nullable_string(field: &str, v: &Value) -> Result<Option<String>, AppError> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(AppError::validation(format!("{field} must be a string"))),
    }
}

fn status(v: &Value) -> Result<TaskStatus, AppError> {
    v.as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            AppError::validation(format!(
                "Invalid status. Must be one of: {}",
                allowed(TaskStatus::ALL)
            ))
        })
}

fn priority(v: &Value) -> Result<TaskPriority, AppError> {
    v.as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            AppError::validation(format!(
                "Invalid priority. Must be one of: {}",
                allowed(TaskPriority::ALL)
            ))
        })
}

fn nullable_due_date(v: &Value) -> Result<Option<Date>, AppError> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => parse_due_date(s)
            .map(Some)
            .ok_or_else(|| AppError::validation("Invalid dueDate. Must be a valid date (YYYY-MM-DD)")),
        _ => Err(AppError::validation("Invalid dueDate. Must be a valid date (YYYY-MM-DD)")),
    }
}

/// Accepts a plain calendar date or an RFC 3339 timestamp. For timestamps the
/// date is taken as written, without converting to UTC or the server zone.
pub fn parse_due_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .or_else(|| OffsetDateTime::parse(raw, &Rfc3339).ok().map(|t| t.date()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use time::macros::date;

    fn details(err: AppError) -> String {
        match err {
            AppError::Validation(d) => d,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn create_with_title_only_uses_defaults() {
        let task = new_task(&json!({ "title": "Buy milk" })).unwrap();
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::Low);
        assert_eq!(task.description, None);
        assert_eq!(task.due_date, None);
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!({ "title": "" }))]
    #[case(json!({ "title": "   " }))]
    #[case(json!({ "title": null }))]
    fn create_rejects_missing_or_blank_title(#[case] body: Value) {
        assert_eq!(details(new_task(&body).unwrap_err()), "Title is required");
    }

    #[test]
    fn create_trims_title_and_ignores_unknown_fields() {
        let owner = uuid::Uuid::new_v4();
        let task = new_task(&json!({
            "title": "  Ship it  ",
            "userId": owner,
            "color": "red"
        }))
        .unwrap();
        assert_eq!(task.title, "Ship it");
    }

    #[test]
    fn enum_errors_list_allowed_values() {
        let msg = details(new_task(&json!({ "title": "t", "priority": "URGENT" })).unwrap_err());
        assert_eq!(msg, "Invalid priority. Must be one of: LOW, MEDIUM, HIGH");
        let msg = details(new_task(&json!({ "title": "t", "status": "todo" })).unwrap_err());
        assert_eq!(msg, "Invalid status. Must be one of: TODO, IN_PROGRESS, DONE");
    }

    #[test]
    fn description_must_be_string() {
        let msg = details(new_task(&json!({ "title": "t", "description": 5 })).unwrap_err());
        assert!(msg.contains("description"));
    }

    #[rstest]
    #[case("2025-12-31", date!(2025 - 12 - 31))]
    #[case("2025-12-31T00:00:00Z", date!(2025 - 12 - 31))]
    #[case("2025-12-31T23:30:00-08:00", date!(2025 - 12 - 31))]
    fn due_date_keeps_calendar_day(#[case] raw: &str, #[case] expected: Date) {
        let task = new_task(&json!({ "title": "t", "dueDate": raw })).unwrap();
        assert_eq!(task.due_date, Some(expected));
    }

    #[rstest]
    #[case(json!("2025-02-30"))]
    #[case(json!("tomorrow"))]
    #[case(json!(20251231))]
    fn due_date_rejects_invalid(#[case] raw: Value) {
        let msg = details(new_task(&json!({ "title": "t", "dueDate": raw })).unwrap_err());
        assert!(msg.contains("dueDate"));
    }

    #[test]
    fn patch_keeps_omitted_fields_absent() {
        let patch = task_patch(&json!({ "status": "DONE" })).unwrap();
        assert_eq!(
            patch,
            TaskPatch {
                status: Some(TaskStatus::Done),
                ..Default::default()
            }
        );
    }

    #[test]
    fn patch_can_clear_nullable_fields() {
        let patch = task_patch(&json!({ "description": null, "dueDate": null })).unwrap();
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.due_date, Some(None));
    }

    #[test]
    fn patch_validates_like_create() {
        assert!(task_patch(&json!({ "title": "  " })).is_err());
        assert!(task_patch(&json!({ "status": null })).is_err());
        assert!(task_patch(&json!({ "priority": "NOPE" })).is_err());
        assert!(task_patch(&json!(["title"])).is_err());
    }

    #[test]
    fn patch_ignores_owner_field() {
        let patch = task_patch(&json!({ "userId": uuid::Uuid::new_v4() })).unwrap();
        assert!(patch.is_empty());
    }

    #[rstest]
    #[case(None, StatusFilter::All)]
    #[case(Some(""), StatusFilter::All)]
    #[case(Some("all"), StatusFilter::All)]
    #[case(Some("ALL"), StatusFilter::All)]
    #[case(Some("DONE"), StatusFilter::Only(TaskStatus::Done))]
    fn list_filter_accepts(#[case] raw: Option<&str>, #[case] expected: StatusFilter) {
        assert_eq!(list_filter(raw, None).unwrap().status, expected);
    }

    #[test]
    fn list_filter_rejects_unknown_status() {
        let msg = details(list_filter(Some("ARCHIVED"), None).unwrap_err());
        assert_eq!(msg, "Invalid status filter. Must be one of: TODO, IN_PROGRESS, DONE, ALL");
    }

    #[test]
    fn empty_search_is_absent() {
        assert_eq!(list_filter(None, Some("")).unwrap().search, None);
        assert_eq!(
            list_filter(None, Some("Project")).unwrap().search.as_deref(),
            Some("Project")
        );
    }
}
