//! Dataset file manifests

use std::collections::BTreeMap;
use tracing::debug;

use crate::connection::SearchConnection;
use crate::context::ContextOptions;
use crate::models::{Constraints, SearchError, SearchResult, SearchType};
use crate::results::{Record, ResultRecord};

/// Checksum and size of one file of a dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub checksum_type: Option<String>,
    pub checksum: Option<String>,
    pub size: Option<u64>,
}

/// Map filename to checksum and size for the files of one dataset version.
///
/// The search excludes replicas and must match exactly one dataset.
pub async fn get_manifest(
    connection: &SearchConnection,
    drs_id: &str,
    version: &str,
) -> SearchResult<BTreeMap<String, ManifestEntry>> {
    let options = ContextOptions::new()
        .search_type(SearchType::Dataset)
        .facets("drs_id")
        .replica(false);
    let constraints = Constraints::new().with("drs_id", drs_id).with("version", version);

    let mut context = connection.new_context_with(options, constraints)?;
    let mut datasets = context.search().await?;

    match datasets.len() {
        1 => {}
        0 => {
            return Err(SearchError::ManifestError(format!(
                "Search for dataset {}.v{} returns no hits",
                drs_id, version
            )))
        }
        _ => {
            return Err(SearchError::ManifestError(format!(
                "Search for dataset {}.v{} returns multiple hits",
                drs_id, version
            )))
        }
    }

    let dataset = match datasets.get(0).await? {
        Record::Dataset(dataset) => dataset,
        other => {
            return Err(SearchError::protocol(format!(
                "expected a dataset record, got {}",
                other.search_type()
            )))
        }
    };

    let mut files = dataset.file_context().await?.with_facets("dataset_id");
    let mut results = files.search().await?;
    debug!("Building manifest of {} files for {}.v{}", results.len(), drs_id, version);

    let mut manifest = BTreeMap::new();
    for record in results.collect_all().await? {
        let file = match record.as_file() {
            Some(file) => file,
            None => continue,
        };
        let filename = file
            .filename()
            .ok_or_else(|| SearchError::protocol(format!("file record has no title: {:?}", file.id())))?;
        manifest.insert(
            filename,
            ManifestEntry {
                checksum_type: file.checksum_type(),
                checksum: file.checksum(),
                size: file.size(),
            },
        );
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::stub::StubTransport;
    use crate::transport::{HttpReply, Transport};
    use serde_json::json;
    use std::sync::Arc;

    const DRS_ID: &str = "cmip5.output1.MOHC.HadGEM2-ES.rcp45.mon.atmos.Amon.r1i1p1";

    fn connect(stub: &Arc<StubTransport>) -> SearchConnection {
        SearchConnection::builder("https://esgf.ceda.ac.uk/esg-search")
            .distrib(false)
            .transport(Arc::clone(stub) as Arc<dyn Transport>)
            .build()
            .unwrap()
    }

    fn reply(docs: serde_json::Value) -> HttpReply {
        let total = docs.as_array().map(|d| d.len()).unwrap_or(0);
        HttpReply::ok(
            json!({
                "response": {"numFound": total, "docs": docs},
                "facet_counts": {"facet_fields": {}}
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn test_manifest() {
        let stub = Arc::new(StubTransport::new(|_, params| {
            if params["type"] == vec!["Dataset"] {
                assert_eq!(params["drs_id"], vec![DRS_ID]);
                assert_eq!(params["version"], vec!["20111128"]);
                assert_eq!(params["replica"], vec!["false"]);
                reply(json!([{"id": format!("{}.v20111128|esgf-data1.ceda.ac.uk", DRS_ID)}]))
            } else {
                reply(json!([
                    {"id": "f2", "title": "b.nc", "size": 20, "checksum": ["bb"], "checksum_type": ["SHA256"]},
                    {"id": "f1", "title": "a.nc", "size": 10, "checksum": ["aa"], "checksum_type": ["SHA256"]}
                ]))
            }
        }));
        let conn = connect(&stub);

        let manifest = get_manifest(&conn, DRS_ID, "20111128").await.unwrap();
        assert_eq!(manifest.keys().collect::<Vec<_>>(), vec!["a.nc", "b.nc"]);
        assert_eq!(
            manifest["a.nc"],
            ManifestEntry {
                checksum_type: Some("SHA256".to_string()),
                checksum: Some("aa".to_string()),
                size: Some(10),
            }
        );
    }

    #[tokio::test]
    async fn test_manifest_requires_single_dataset() {
        let stub = Arc::new(StubTransport::new(|_, _| reply(json!([{"id": "d1"}, {"id": "d2"}]))));
        let conn = connect(&stub);

        let err = get_manifest(&conn, DRS_ID, "1").await.unwrap_err();
        assert!(matches!(err, SearchError::ManifestError(msg) if msg.contains("multiple hits")));

        let stub = Arc::new(StubTransport::new(|_, _| reply(json!([]))));
        let conn = connect(&stub);
        let err = get_manifest(&conn, DRS_ID, "1").await.unwrap_err();
        assert!(matches!(err, SearchError::ManifestError(msg) if msg.contains("no hits")));
    }
}
