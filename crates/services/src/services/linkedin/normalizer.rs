use serde::Serialize;
use serde_json::Value;

use super::EndpointKind;

pub const TYPE_COMMENT: &str = "com.linkedin.voyager.dash.social.Comment";
pub const TYPE_REACTION: &str = "com.linkedin.voyager.dash.social.Reaction";
pub const TYPE_UPDATE: &str = "com.linkedin.voyager.dash.feed.Update";

/// One normalized page. `items` are the per-endpoint projections, already
/// shaped for the REST response; `pagination_token` must be echoed into the
/// next page URL when present.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    pub items: Vec<Value>,
    pub pagination_token: Option<String>,
    pub total_count: Option<i64>,
    pub raw_had_error: bool,
}

/// Object-hop traversal that answers `None` on any missing or non-object
/// step instead of panicking on LinkedIn's shape variance.
pub(crate) fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

fn get_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    get_path(value, path).and_then(Value::as_str)
}

fn get_i64(value: &Value, path: &[&str]) -> Option<i64> {
    get_path(value, path).and_then(Value::as_i64)
}

/// Depth-first scan for the first string starting with `prefix`. Last-resort
/// extraction for envelopes whose exact nesting LinkedIn likes to move.
pub(crate) fn find_string_with_prefix<'a>(value: &'a Value, prefix: &str) -> Option<&'a str> {
    match value {
        Value::String(s) if s.starts_with(prefix) => Some(s),
        Value::Array(items) => items.iter().find_map(|v| find_string_with_prefix(v, prefix)),
        Value::Object(map) => map.values().find_map(|v| find_string_with_prefix(v, prefix)),
        _ => None,
    }
}

/// A comment, projected down to what the REST surface promises. Only the
/// author name and the text are load-bearing; everything else may be absent
/// without dropping the item.
#[derive(Debug, Clone, Serialize)]
pub struct CommentItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urn: Option<String>,
    pub actor_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_profile_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_degree: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at_ms: Option<i64>,
    pub is_reply: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionItem {
    pub reaction_type: String,
    pub actor_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_urn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_profile_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_degree: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostItem {
    pub urn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
}

/// Normalize one LinkedIn GraphQL envelope. Shape variance is benign — a
/// missing hop just yields fewer fields or fewer items; only a response that
/// is not a JSON object at all is reported as an error page.
pub fn parse_page(kind: EndpointKind, envelope: &Value) -> PageResult {
    if !envelope.is_object() {
        return PageResult { raw_had_error: true, ..Default::default() };
    }

    let root = find_root(kind, envelope);
    let mut page = PageResult::default();

    if let Some(root) = root {
        page.pagination_token =
            get_str(root, &["metadata", "paginationToken"]).map(str::to_string);
        page.total_count = get_i64(root, &["paging", "total"]);
    }

    let included = envelope
        .get("included")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    page.items = match kind {
        EndpointKind::PostComments => collect_comments(included),
        EndpointKind::PostReactions => collect_reactions(included),
        EndpointKind::Feed | EndpointKind::ProfilePosts => collect_updates(root, included),
        EndpointKind::ProfileComments => collect_profile_comments(root, included),
    };

    page
}

const ROOT_KEYS: &[(EndpointKind, &str)] = &[
    (EndpointKind::Feed, "feedDashMainFeedByMainFeed"),
    (EndpointKind::PostComments, "socialDashCommentsBySocialDetail"),
    (EndpointKind::PostReactions, "socialDashReactionsByReactionType"),
    (EndpointKind::ProfilePosts, "feedDashProfileUpdatesByMemberShareFeed"),
    (EndpointKind::ProfileComments, "feedDashProfileUpdatesByMemberShareFeed"),
];

fn find_root<'a>(kind: EndpointKind, envelope: &'a Value) -> Option<&'a Value> {
    let inner = get_path(envelope, &["data", "data"])?;

    if let Some((_, key)) = ROOT_KEYS.iter().find(|(k, _)| *k == kind) {
        if let Some(root) = inner.get(*key).filter(|v| v.is_object()) {
            return Some(root);
        }
    }

    // Query-id rotations rename the root; any object-valued entry that is
    // not bookkeeping still carries the same inner shape.
    inner
        .as_object()?
        .iter()
        .find(|(key, value)| !key.starts_with('$') && value.is_object())
        .map(|(_, value)| value)
}

fn typed<'a>(included: &'a [Value], type_name: &str) -> impl Iterator<Item = &'a Value> {
    let type_name = type_name.to_string();
    included
        .iter()
        .filter(move |v| get_str(v, &["$type"]) == Some(type_name.as_str()))
}

fn collect_comments(included: &[Value]) -> Vec<Value> {
    typed(included, TYPE_COMMENT)
        .filter_map(|raw| {
            let item = project_comment(raw);
            if item.is_none() {
                tracing::warn!(
                    "dropping comment missing required fields: {}",
                    get_str(raw, &["entityUrn"]).unwrap_or("<no urn>")
                );
            }
            item
        })
        .map(|item| serde_json::to_value(item).unwrap_or(Value::Null))
        .collect()
}

fn project_comment(raw: &Value) -> Option<CommentItem> {
    let actor_name = get_str(raw, &["commenter", "title", "text"])
        .or_else(|| get_str(raw, &["commenter", "accessibilityText"]))?
        .to_string();
    let text = get_str(raw, &["commentary", "text"])?.to_string();

    Some(CommentItem {
        urn: get_str(raw, &["entityUrn"]).map(str::to_string),
        actor_name,
        actor_headline: get_str(raw, &["commenter", "subtitle", "text"]).map(str::to_string),
        actor_profile_url: get_str(raw, &["commenter", "navigationUrl"]).map(str::to_string),
        connection_degree: get_str(raw, &["commenter", "supplementaryActorInfo", "text"])
            .map(str::to_string),
        text,
        created_at_ms: get_i64(raw, &["createdAt"]),
        is_reply: raw.get("parentCommentUrn").map(|v| !v.is_null()).unwrap_or(false),
    })
}

fn collect_reactions(included: &[Value]) -> Vec<Value> {
    typed(included, TYPE_REACTION)
        .filter_map(|raw| {
            let item = project_reaction(raw);
            if item.is_none() {
                tracing::warn!(
                    "dropping reaction missing required fields: {}",
                    get_str(raw, &["actorUrn"]).unwrap_or("<no actor>")
                );
            }
            item
        })
        .map(|item| serde_json::to_value(item).unwrap_or(Value::Null))
        .collect()
}

fn project_reaction(raw: &Value) -> Option<ReactionItem> {
    let reaction_type = get_str(raw, &["reactionType"])?.to_string();
    let actor_name = get_str(raw, &["reactorLockup", "title", "text"])?.to_string();

    Some(ReactionItem {
        reaction_type,
        actor_name,
        actor_urn: get_str(raw, &["actorUrn"]).map(str::to_string),
        actor_headline: get_str(raw, &["reactorLockup", "subtitle", "text"]).map(str::to_string),
        actor_profile_url: get_str(raw, &["reactorLockup", "navigationUrl"]).map(str::to_string),
        connection_degree: get_str(raw, &["reactorLockup", "label", "text"]).map(str::to_string),
    })
}

fn element_refs<'a>(root: Option<&'a Value>) -> Option<Vec<&'a str>> {
    let root = root?;
    let refs = root
        .get("*elements")
        .or_else(|| root.get("elements"))?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    Some(refs)
}

fn collect_updates(root: Option<&Value>, included: &[Value]) -> Vec<Value> {
    // Root order wins when the sideload references are present; the flat
    // `included` order is only an approximation of it.
    let updates: Vec<&Value> = match element_refs(root) {
        Some(refs) => {
            let by_entity_urn: std::collections::HashMap<&str, &Value> = typed(included, TYPE_UPDATE)
                .filter_map(|v| get_str(v, &["entityUrn"]).map(|urn| (urn, v)))
                .collect();
            refs.iter().filter_map(|urn| by_entity_urn.get(urn).copied()).collect()
        }
        None => typed(included, TYPE_UPDATE).collect(),
    };

    updates
        .into_iter()
        .filter_map(|raw| {
            let item = project_update(raw);
            if item.is_none() {
                tracing::warn!("dropping update without entityUrn");
            }
            item
        })
        .map(|item| serde_json::to_value(item).unwrap_or(Value::Null))
        .collect()
}

fn project_update(raw: &Value) -> Option<PostItem> {
    Some(PostItem {
        urn: get_str(raw, &["entityUrn"])?.to_string(),
        text: get_str(raw, &["commentary", "text", "text"]).map(str::to_string),
        actor_name: get_str(raw, &["actor", "name", "text"]).map(str::to_string),
        actor_headline: get_str(raw, &["actor", "description", "text"]).map(str::to_string),
        age_text: get_str(raw, &["actor", "subDescription", "text"]).map(str::to_string),
        share_url: get_str(raw, &["socialContent", "shareUrl"])
            .or_else(|| get_str(raw, &["updateMetadata", "shareUrl"]))
            .map(str::to_string),
    })
}

fn header_text(update: &Value) -> Option<&str> {
    get_str(update, &["header", "text", "text"])
        .or_else(|| get_str(update, &["header", "text"]))
        .or_else(|| get_str(update, &["metadata", "headerText", "text"]))
}

/// The profile-comments feed is sideloaded twice over: the root lists update
/// urns, each update's header says what the member did ("… commented on" /
/// "… replied to"), and the comment bodies live as separate `included`
/// entries referenced by urn. Join the three and keep the top-level
/// comments.
fn collect_profile_comments(root: Option<&Value>, included: &[Value]) -> Vec<Value> {
    let mut by_entity_urn = std::collections::HashMap::new();
    let mut by_urn = std::collections::HashMap::new();
    let mut updates_by_urn = std::collections::HashMap::new();

    for entry in included {
        if let Some(urn) = get_str(entry, &["entityUrn"]) {
            by_entity_urn.insert(urn, entry);
            if get_str(entry, &["$type"]) == Some(TYPE_UPDATE) {
                updates_by_urn.insert(urn, entry);
            }
        }
        if let Some(urn) = get_str(entry, &["urn"]) {
            by_urn.insert(urn, entry);
        }
    }

    let update_refs: Vec<&str> = match element_refs(root) {
        Some(refs) => refs,
        None => updates_by_urn.keys().copied().collect(),
    };

    let mut items = Vec::new();
    for update_urn in update_refs {
        let Some(update) = updates_by_urn.get(update_urn) else {
            continue;
        };

        let Some(header) = header_text(update) else {
            continue;
        };
        if header.contains("replied to") {
            continue;
        }
        if !header.contains("commented on") {
            continue;
        }

        let comment_refs = update
            .get("*highlightedComments")
            .or_else(|| get_path(update, &["metadata", "*highlightedComments"]))
            .and_then(Value::as_array);
        let Some(comment_refs) = comment_refs else {
            continue;
        };

        for comment_ref in comment_refs.iter().filter_map(Value::as_str) {
            let resolved = by_urn
                .get(comment_ref)
                .or_else(|| by_entity_urn.get(comment_ref))
                .copied();
            let Some(raw_comment) = resolved else {
                tracing::warn!("sideloaded comment {} not present in included", comment_ref);
                continue;
            };

            match project_comment(raw_comment) {
                Some(item) => {
                    items.push(serde_json::to_value(item).unwrap_or(Value::Null));
                }
                None => {
                    tracing::warn!("dropping sideloaded comment missing required fields");
                }
            }
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn comment(urn: &str, name: &str, text: Option<&str>) -> Value {
        let mut obj = json!({
            "$type": TYPE_COMMENT,
            "entityUrn": urn,
            "urn": format!("urn:li:comment:({},1)", urn),
            "commenter": {
                "title": { "text": name },
                "subtitle": { "text": "Staff Engineer" },
                "navigationUrl": "https://www.linkedin.com/in/someone",
                "supplementaryActorInfo": { "text": "• 2nd" }
            },
            "createdAt": 1722470400000i64
        });
        if let Some(text) = text {
            obj["commentary"] = json!({ "text": text });
        }
        obj
    }

    #[test]
    fn comments_page_extracts_projection_and_metadata() {
        let envelope = json!({
            "data": { "data": { "socialDashCommentsBySocialDetail": {
                "metadata": { "paginationToken": "tok-1" },
                "paging": { "total": 42 }
            } } },
            "included": [
                comment("urn:li:fsd_comment:1", "Jane Doe", Some("Great post!")),
                { "$type": "com.linkedin.voyager.dash.feed.Update", "entityUrn": "urn:li:fsd_update:9" }
            ]
        });

        let page = parse_page(EndpointKind::PostComments, &envelope);
        assert!(!page.raw_had_error);
        assert_eq!(page.pagination_token.as_deref(), Some("tok-1"));
        assert_eq!(page.total_count, Some(42));
        assert_eq!(page.items.len(), 1);

        let item = &page.items[0];
        assert_eq!(item["actor_name"], "Jane Doe");
        assert_eq!(item["text"], "Great post!");
        assert_eq!(item["connection_degree"], "• 2nd");
        assert_eq!(item["is_reply"], false);
    }

    #[test]
    fn comments_missing_required_fields_are_dropped() {
        let envelope = json!({
            "data": { "data": { "socialDashCommentsBySocialDetail": {} } },
            "included": [
                comment("urn:li:fsd_comment:1", "Jane Doe", None),
                comment("urn:li:fsd_comment:2", "John Roe", Some("Kept")),
            ]
        });

        let page = parse_page(EndpointKind::PostComments, &envelope);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0]["actor_name"], "John Roe");
    }

    #[test]
    fn reactions_page_projects_lockups() {
        let envelope = json!({
            "data": { "data": { "socialDashReactionsByReactionType": {
                "paging": { "total": 2 }
            } } },
            "included": [
                {
                    "$type": TYPE_REACTION,
                    "reactionType": "LIKE",
                    "actorUrn": "urn:li:fsd_profile:AAA",
                    "reactorLockup": {
                        "title": { "text": "Jane Doe" },
                        "subtitle": { "text": "CTO" },
                        "navigationUrl": "https://www.linkedin.com/in/janedoe"
                    }
                },
                { "$type": TYPE_REACTION, "reactionType": "PRAISE" }
            ]
        });

        let page = parse_page(EndpointKind::PostReactions, &envelope);
        // The second reaction has no reactor lockup and is dropped.
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0]["reaction_type"], "LIKE");
        assert_eq!(page.items[0]["actor_name"], "Jane Doe");
        assert_eq!(page.total_count, Some(2));
        assert_eq!(page.pagination_token, None);
    }

    #[test]
    fn updates_follow_root_element_order() {
        let envelope = json!({
            "data": { "data": { "feedDashProfileUpdatesByMemberShareFeed": {
                "*elements": ["urn:li:fsd_update:2", "urn:li:fsd_update:1"]
            } } },
            "included": [
                { "$type": TYPE_UPDATE, "entityUrn": "urn:li:fsd_update:1",
                  "commentary": { "text": { "text": "first" } } },
                { "$type": TYPE_UPDATE, "entityUrn": "urn:li:fsd_update:2",
                  "commentary": { "text": { "text": "second" } } }
            ]
        });

        let page = parse_page(EndpointKind::ProfilePosts, &envelope);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0]["text"], "second");
        assert_eq!(page.items[1]["text"], "first");
    }

    #[test]
    fn profile_comments_join_keeps_only_commented_on() {
        let envelope = json!({
            "data": { "data": { "feedDashProfileUpdatesByMemberShareFeed": {
                "*elements": ["urn:li:fsd_update:10", "urn:li:fsd_update:11"],
                "metadata": { "paginationToken": "tok-2" }
            } } },
            "included": [
                {
                    "$type": TYPE_UPDATE,
                    "entityUrn": "urn:li:fsd_update:10",
                    "header": { "text": { "text": "Jane Doe commented on this" } },
                    "*highlightedComments": ["urn:li:comment:(urn:li:fsd_comment:1,1)"]
                },
                {
                    "$type": TYPE_UPDATE,
                    "entityUrn": "urn:li:fsd_update:11",
                    "header": { "text": { "text": "Jane Doe replied to a comment on this" } },
                    "*highlightedComments": ["urn:li:comment:(urn:li:fsd_comment:2,1)"]
                },
                comment("urn:li:fsd_comment:1", "Jane Doe", Some("Top-level take")),
                comment("urn:li:fsd_comment:2", "Jane Doe", Some("A reply")),
            ]
        });

        let page = parse_page(EndpointKind::ProfileComments, &envelope);
        assert_eq!(page.pagination_token.as_deref(), Some("tok-2"));
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0]["text"], "Top-level take");
    }

    #[test]
    fn unknown_root_key_still_parses() {
        let envelope = json!({
            "data": { "data": {
                "$recipeTypes": ["x"],
                "socialDashCommentsByNewName": {
                    "metadata": { "paginationToken": "tok-3" }
                }
            } },
            "included": []
        });

        let page = parse_page(EndpointKind::PostComments, &envelope);
        assert_eq!(page.pagination_token.as_deref(), Some("tok-3"));
        assert!(page.items.is_empty());
        assert!(!page.raw_had_error);
    }

    #[test]
    fn non_object_envelope_flags_error() {
        let page = parse_page(EndpointKind::Feed, &json!("<html>rate limited</html>"));
        assert!(page.raw_had_error);
        assert!(page.items.is_empty());
        assert_eq!(page.pagination_token, None);
    }

    #[test]
    fn find_string_with_prefix_scans_deeply() {
        let value = json!({
            "a": [ { "b": { "c": "urn:li:ugcPost:77" } } ]
        });
        assert_eq!(find_string_with_prefix(&value, "urn:li:ugcPost:"), Some("urn:li:ugcPost:77"));
        assert_eq!(find_string_with_prefix(&value, "urn:li:activity:"), None);
    }
}
