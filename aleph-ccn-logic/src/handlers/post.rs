use crate::{
    pipeline::error::{PipelineError, RejectCode},
    repository::{messages, posts},
    types::{content::PostContent, MessageEnvelope},
};
use anyhow::anyhow;
use sea_orm::ConnectionTrait;
use serde_json::Value;

pub async fn apply<C: ConnectionTrait>(
    db: &C,
    envelope: &MessageEnvelope,
    content: &PostContent,
) -> Result<(), PipelineError> {
    let item_hash = envelope.item_hash.as_str();

    let Some(original_hash) = content.amends.as_deref() else {
        posts::insert(
            db,
            posts::NewPost {
                item_hash: item_hash.to_string(),
                address: content.address.clone(),
                post_type: content.post_type.clone(),
                amends: None,
                channel: envelope.channel.clone(),
                time: content.time,
                content: content.content.clone(),
            },
        )
        .await?;
        refresh_visibility(db, item_hash).await?;
        return Ok(());
    };

    let Some(original) = posts::get(db, original_hash).await? else {
        if messages::exists(db, original_hash).await? {
            // the ref resolves, but not to an amendable post
            tracing::debug!(item_hash, original_hash, "amendment target is not a post");
            return Ok(());
        }
        // the original may still be in flight somewhere in the queue
        return Err(PipelineError::Transient(anyhow!(
            "amendment target {original_hash} not yet processed"
        )));
    };

    if original.address != content.address {
        return Err(PipelineError::permanent(
            RejectCode::Unauthorized,
            format!("amendment of {original_hash} by a different address"),
        ));
    }
    if original.amends.is_some() {
        tracing::debug!(item_hash, original_hash, "refusing to amend an amendment");
        return Ok(());
    }

    posts::insert(
        db,
        posts::NewPost {
            item_hash: item_hash.to_string(),
            address: content.address.clone(),
            post_type: content.post_type.clone(),
            amends: Some(original_hash.to_string()),
            channel: envelope.channel.clone(),
            time: content.time,
            content: content.content.clone(),
        },
    )
    .await?;
    refresh_visibility(db, original_hash).await?;
    Ok(())
}

/// FORGET reverse effect: drop the revision; if it was an amendment the
/// original's visible content is recomputed from what remains.
pub async fn revert<C: ConnectionTrait>(db: &C, item_hash: &str) -> Result<(), PipelineError> {
    let Some(post) = posts::get(db, item_hash).await? else {
        return Ok(());
    };
    posts::delete(db, item_hash).await?;
    if let Some(original_hash) = post.amends {
        refresh_visibility(db, &original_hash).await?;
    }
    Ok(())
}

async fn refresh_visibility<C: ConnectionTrait>(
    db: &C,
    original_hash: &str,
) -> Result<(), PipelineError> {
    let revisions = posts::revisions(db, original_hash).await?;
    let candidates: Vec<(f64, &str, &Value)> = revisions
        .iter()
        .map(|post| (post.time, post.item_hash.as_str(), &post.content))
        .collect();

    if let Some((time, revision_hash, content)) = pick_visible(&candidates) {
        posts::set_visible(db, original_hash, content, time, revision_hash).await?;
    }
    Ok(())
}

/// The winning revision: highest content time, ties broken by item hash.
fn pick_visible<'a>(candidates: &[(f64, &'a str, &'a Value)]) -> Option<(f64, &'a str, &'a Value)> {
    candidates
        .iter()
        .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn highest_time_wins() {
        let a = json!("A");
        let b = json!("B");
        let c = json!("C");
        let candidates = vec![
            (10.0, "p0", &a),
            (20.0, "p1", &b),
            (15.0, "p2", &c),
        ];
        let (time, hash, content) = pick_visible(&candidates).unwrap();
        assert_eq!((time, hash), (20.0, "p1"));
        assert_eq!(content, &json!("B"));
    }

    #[test]
    fn ties_break_by_item_hash() {
        let a = json!("A");
        let b = json!("B");
        let candidates = vec![(10.0, "aaa", &a), (10.0, "bbb", &b)];
        let (_, hash, _) = pick_visible(&candidates).unwrap();
        assert_eq!(hash, "bbb");
    }

    #[test]
    fn empty_set_has_no_winner() {
        assert!(pick_visible(&[]).is_none());
    }
}
