use crate::{
    pipeline::error::PipelineError,
    repository::aggregates,
    types::content::AggregateContent,
};
use sea_orm::ConnectionTrait;
use serde_json::Value;

/// Applies one AGGREGATE element: record it for replay, then bring the
/// materialized view up to date. The view is updated incrementally when
/// the element lands at the end of the fold order and rebuilt otherwise.
pub async fn apply<C: ConnectionTrait>(
    db: &C,
    item_hash: &str,
    content: &AggregateContent,
) -> Result<(), PipelineError> {
    let inserted = aggregates::insert_element(
        db,
        item_hash,
        &content.address,
        &content.key,
        content.time,
        &content.content,
    )
    .await?;
    if !inserted {
        // same element already folded in
        return Ok(());
    }

    let view = aggregates::get_view(db, &content.address, &content.key).await?;
    match view {
        Some(view) if content.time > view.last_revision_time => {
            let mut merged = view.content;
            merge(&mut merged, &content.content);
            aggregates::upsert_view(
                db,
                &content.address,
                &content.key,
                &merged,
                view.creation_time,
                content.time,
            )
            .await?;
        }
        // out-of-order or tied element: replay the whole fold
        _ => refold(db, &content.address, &content.key).await?,
    }
    Ok(())
}

/// FORGET reverse effect: drop the element and rebuild the view from
/// what is left.
pub async fn revert<C: ConnectionTrait>(db: &C, item_hash: &str) -> Result<(), PipelineError> {
    if let Some(element) = aggregates::delete_element(db, item_hash).await? {
        refold(db, &element.address, &element.key).await?;
    }
    Ok(())
}

async fn refold<C: ConnectionTrait>(
    db: &C,
    address: &str,
    key: &str,
) -> Result<(), PipelineError> {
    let elements = aggregates::elements(db, address, key).await?;
    match fold(elements.iter().map(|e| (e.time, &e.content))) {
        Some((content, creation_time, last_revision_time)) => {
            aggregates::upsert_view(db, address, key, &content, creation_time, last_revision_time)
                .await?
        }
        None => aggregates::delete_view(db, address, key).await?,
    }
    Ok(())
}

/// Folds elements already sorted by `(time, item_hash)` into the
/// materialized content. Returns `None` for an empty element set.
fn fold<'a>(elements: impl Iterator<Item = (f64, &'a Value)>) -> Option<(Value, f64, f64)> {
    let mut result: Option<(Value, f64, f64)> = None;
    for (time, content) in elements {
        match &mut result {
            None => result = Some((content.clone(), time, time)),
            Some((merged, _, last)) => {
                merge(merged, content);
                *last = time;
            }
        }
    }
    result
}

/// Deep merge: objects merge recursively, `null` removes the key, any
/// other value replaces what was there.
fn merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    base.remove(key);
                } else if let Some(existing) = base.get_mut(key) {
                    merge(existing, value);
                } else {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fold_values(elements: &[(f64, Value)]) -> Value {
        let mut sorted: Vec<_> = elements.to_vec();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        fold(sorted.iter().map(|(time, content)| (*time, content)))
            .expect("non-empty")
            .0
    }

    #[test]
    fn latest_scalar_wins() {
        let result = fold_values(&[
            (100.0, json!({"name": "x"})),
            (200.0, json!({"name": "y", "age": 3})),
        ]);
        assert_eq!(result, json!({"name": "y", "age": 3}));
    }

    #[test]
    fn null_removes_key_but_later_write_reasserts() {
        // the null lands between the two writes in time order, so the
        // later value dominates
        let result = fold_values(&[
            (100.0, json!({"name": "x"})),
            (200.0, json!({"name": "y", "age": 3})),
            (150.0, json!({"age": null})),
        ]);
        assert_eq!(result, json!({"name": "y", "age": 3}));

        let result = fold_values(&[
            (100.0, json!({"name": "x", "age": 3})),
            (150.0, json!({"age": null})),
        ]);
        assert_eq!(result, json!({"name": "x"}));
    }

    #[test]
    fn objects_merge_recursively() {
        let result = fold_values(&[
            (1.0, json!({"profile": {"name": "x", "bio": "hi"}})),
            (2.0, json!({"profile": {"name": "y"}})),
        ]);
        assert_eq!(result, json!({"profile": {"name": "y", "bio": "hi"}}));
    }

    #[test]
    fn fold_is_order_independent() {
        let elements = [
            (100.0, json!({"a": 1, "nested": {"x": true}})),
            (200.0, json!({"b": 2, "nested": {"y": false}})),
            (150.0, json!({"a": null, "c": 3})),
            (300.0, json!({"nested": {"x": null}})),
        ];

        let expected = fold_values(&elements);
        // every rotation feeds fold_values the same multiset
        for rotation in 0..elements.len() {
            let mut rotated = elements.to_vec();
            rotated.rotate_left(rotation);
            assert_eq!(fold_values(&rotated), expected, "rotation {rotation}");
        }
        assert_eq!(expected, json!({"b": 2, "c": 3, "nested": {"y": false}}));
    }

    #[test]
    fn non_object_content_replaces() {
        let result = fold_values(&[(1.0, json!({"a": 1})), (2.0, json!("scalar"))]);
        assert_eq!(result, json!("scalar"));
    }
}
