//! Human-readable one-liners for tool calls. The client shows these in
//! `tool_start` / `tool_done` events and the assistant message keeps them
//! in its tool-call log instead of full results.

use serde_json::Value;

use crate::kind::ToolKind;

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("1 {one}")
    } else {
        format!("{n} {many}")
    }
}

fn str_at<'a>(v: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = v;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str().filter(|s| !s.is_empty())
}

fn count_at(v: &Value, key: &str) -> usize {
    v.get(key).and_then(Value::as_array).map(Vec::len).unwrap_or(0)
}

/// The error message carried by a failed result, if any.
pub fn result_error(result: &Value) -> Option<&str> {
    result.get("error").and_then(Value::as_str)
}

/// Short description of what a call is about to do, from its input.
pub fn input_summary(kind: ToolKind, input: &Value) -> String {
    let target = str_at(input, &["property_address"])
        .or_else(|| str_at(input, &["address"]))
        .or_else(|| str_at(input, &["deal_id"]));
    match kind {
        ToolKind::SearchContacts => match str_at(input, &["query"]) {
            Some(q) => format!("\"{q}\""),
            None => "recent contacts".into(),
        },
        ToolKind::AddContact => str_at(input, &["name"]).unwrap_or("new contact").into(),
        ToolKind::UpdateContact => str_at(input, &["name"])
            .or_else(|| str_at(input, &["contact_id"]))
            .unwrap_or("contact")
            .into(),
        ToolKind::CreateFile => str_at(input, &["filename"]).unwrap_or("file").into(),
        ToolKind::CreateTodos => plural(count_at(input, "todos"), "step", "steps"),
        ToolKind::UpdateTodo => match (input.get("index").and_then(Value::as_u64), str_at(input, &["status"])) {
            (Some(i), Some(s)) => format!("step {} → {s}", i + 1),
            _ => "step".into(),
        },
        ToolKind::GetActiveDeals | ToolKind::CheckUpcomingDeadlines => String::new(),
        _ => target.unwrap_or_default().into(),
    }
}

/// One-line outcome of a finished call, e.g. "Found 3 contacts".
pub fn result_summary(kind: ToolKind, result: &Value) -> String {
    if let Some(err) = result_error(result) {
        return format!("Error: {err}");
    }
    let address = str_at(result, &["deal", "property_address"]);
    match kind {
        ToolKind::GetActiveDeals => {
            format!("Found {}", plural(count_at(result, "deals"), "active deal", "active deals"))
        }
        ToolKind::GetDealDetails => format!("Loaded {}", address.unwrap_or("deal")),
        ToolKind::CheckUpcomingDeadlines => match count_at(result, "deadlines") {
            0 => "No deadlines in the next 7 days".into(),
            n => format!("{} in the next 7 days", plural(n, "deadline", "deadlines")),
        },
        ToolKind::SearchContacts => {
            format!("Found {}", plural(count_at(result, "contacts"), "contact", "contacts"))
        }
        ToolKind::CreateDeal => {
            let base = format!("Created deal {}", address.unwrap_or_default());
            if result.pointer("/enrichment/property").map_or(false, |p| !p.is_null()) {
                format!("{base} with property details")
            } else {
                base
            }
        }
        ToolKind::UpdateDeal => {
            let fields = result
                .get("updated_fields")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            format!("Updated {} ({fields})", address.unwrap_or("deal"))
        }
        ToolKind::AddContact => format!(
            "Added contact {}",
            str_at(result, &["contact", "name"]).unwrap_or_default()
        ),
        ToolKind::UpdateContact => format!(
            "Updated contact {}",
            str_at(result, &["contact", "name"]).unwrap_or_default()
        ),
        ToolKind::DraftSocialPost | ToolKind::DraftEmail | ToolKind::DraftListingDescription => {
            if result.get("no_deal_found").and_then(Value::as_bool) == Some(true) {
                "No matching deal; drafting from the conversation".into()
            } else {
                format!("Loaded details for {}", address.unwrap_or("the deal"))
            }
        }
        ToolKind::EnrichProperty => property_summary(result.pointer("/enrichment").unwrap_or(result)),
        ToolKind::CreateFile => format!(
            "Created {}",
            str_at(result, &["file", "filename"]).unwrap_or("file")
        ),
        ToolKind::CreateTodos => format!("Planned {}", plural(count_at(result, "todos"), "step", "steps")),
        ToolKind::UpdateTodo => match (
            result.pointer("/todo/index").and_then(Value::as_u64),
            str_at(result, &["todo", "status"]),
        ) {
            (Some(i), Some(s)) => format!("Step {}: {s}", i + 1),
            _ => "Updated plan".into(),
        },
    }
}

fn property_summary(enrichment: &Value) -> String {
    if let Some(err) = result_error(enrichment) {
        return format!("Property lookup unavailable: {err}");
    }
    let Some(p) = enrichment.get("property").filter(|p| !p.is_null()) else {
        return "No property record found".into();
    };
    let mut parts = Vec::new();
    if let Some(b) = p.get("bedrooms").and_then(Value::as_f64) {
        parts.push(format!("{b} bd"));
    }
    if let Some(b) = p.get("bathrooms").and_then(Value::as_f64) {
        parts.push(format!("{b} ba"));
    }
    if let Some(s) = p.get("squareFootage").and_then(Value::as_i64) {
        parts.push(format!("{s} sqft"));
    }
    if let Some(y) = p.get("yearBuilt").and_then(Value::as_i64) {
        parts.push(format!("built {y}"));
    }
    if parts.is_empty() {
        "Found property record".into()
    } else {
        format!("Found {}", parts.join(" / "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_are_pluralized() {
        let r = json!({ "contacts": [{}, {}, {}] });
        assert_eq!(result_summary(ToolKind::SearchContacts, &r), "Found 3 contacts");
        let r = json!({ "deals": [{}] });
        assert_eq!(result_summary(ToolKind::GetActiveDeals, &r), "Found 1 active deal");
        let r = json!({ "deadlines": [] });
        assert_eq!(
            result_summary(ToolKind::CheckUpcomingDeadlines, &r),
            "No deadlines in the next 7 days"
        );
    }

    #[test]
    fn errors_win_over_kind_specific_text() {
        let r = json!({ "error": "Contact name is required" });
        assert_eq!(
            result_summary(ToolKind::AddContact, &r),
            "Error: Contact name is required"
        );
    }

    #[test]
    fn create_deal_mentions_enrichment() {
        let r = json!({
            "deal": { "property_address": "123 Main St, Austin TX" },
            "enrichment": { "property": { "bedrooms": 4.0 } }
        });
        assert_eq!(
            result_summary(ToolKind::CreateDeal, &r),
            "Created deal 123 Main St, Austin TX with property details"
        );
    }

    #[test]
    fn enrichment_formats_key_facts() {
        let r = json!({ "enrichment": { "property": {
            "bedrooms": 4.0, "bathrooms": 3.0, "squareFootage": 2400, "yearBuilt": 2010
        }}});
        assert_eq!(
            result_summary(ToolKind::EnrichProperty, &r),
            "Found 4 bd / 3 ba / 2400 sqft / built 2010"
        );
    }

    #[test]
    fn input_summaries() {
        assert_eq!(
            input_summary(ToolKind::CreateDeal, &json!({ "property_address": "1 Oak" })),
            "1 Oak"
        );
        assert_eq!(
            input_summary(ToolKind::SearchContacts, &json!({ "query": "Sam" })),
            "\"Sam\""
        );
        assert_eq!(input_summary(ToolKind::GetActiveDeals, &json!({})), "");
    }
}
