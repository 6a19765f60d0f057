use crate::client::SpeachesClient;
use crate::error::Result;
use crate::model::ModelId;
use std::collections::HashSet;

/// Whether each of `models` appears in the server's model listing.
pub async fn check_available(
    client: &SpeachesClient,
    models: &[ModelId],
) -> Result<Vec<(ModelId, bool)>> {
    let listed: HashSet<String> = client
        .list_models()
        .await?
        .into_iter()
        .map(|m| m.id)
        .collect();

    tracing::debug!("Server lists {} models", listed.len());

    Ok(models
        .iter()
        .map(|model| (model.clone(), listed.contains(model.as_str())))
        .collect())
}
