// ==============================================================================
// phenopacket.rs - Phenopacket YAML Generation
// ==============================================================================
// Description: Maps an individual onto a GA4GH phenopacket (schema 1.0) and
//              serializes it as block-style YAML for the Exomiser CLI
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
//
// Output is deterministic: identical input plus an identical `created`
// timestamp yields byte-identical YAML. Keys are emitted in declaration
// order, never alphabetized.
//
// An age of 0 is a real value (infants) and is emitted as `0Y`; only a
// missing age omits the `age` block.
//
// ==============================================================================

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::path::Path;

use crate::error::Result;
use crate::models::{HpoTerm, Individual, SexType};

pub const DEFAULT_CREATOR: &str = "Exomiser Web Interface";
pub const SCHEMA_VERSION: &str = "1.0";

/// Fields of an individual that feed the phenopacket
#[derive(Debug, Clone, Copy)]
pub struct SubjectRecord<'a> {
    pub identity: &'a str,
    pub sex: SexType,
    pub age_years: Option<u32>,
    pub hpo_terms: &'a [HpoTerm],
    pub vcf_file_path: Option<&'a str>,
}

impl<'a> From<&'a Individual> for SubjectRecord<'a> {
    fn from(individual: &'a Individual) -> Self {
        Self {
            identity: &individual.identity,
            sex: individual.sex,
            age_years: individual.age_years,
            hpo_terms: &individual.hpo_terms,
            vcf_file_path: Some(individual.vcf_file_path.as_str()).filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Phenopacket {
    pub id: String,
    pub subject: Subject,
    pub phenotypic_features: Vec<PhenotypicFeature>,
    pub meta_data: MetaData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hts_files: Option<Vec<HtsFile>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    pub id: String,
    pub sex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<Age>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Age {
    /// ISO-8601 style years, e.g. "10Y"
    pub age: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhenotypicFeature {
    #[serde(rename = "type")]
    pub term: OntologyClass,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OntologyClass {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub created: String,
    pub created_by: String,
    pub resources: Vec<Resource>,
    pub phenopacket_schema_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub url: String,
    pub version: String,
    pub namespace_prefix: String,
    pub iri_prefix: String,
}

impl Resource {
    /// Human Phenotype Ontology descriptor
    pub fn hpo() -> Self {
        Self {
            id: "hp".to_string(),
            name: "human phenotype ontology".to_string(),
            url: "http://purl.obolibrary.org/obo/hp.owl".to_string(),
            version: "hp/releases/latest".to_string(),
            namespace_prefix: "HP".to_string(),
            iri_prefix: "http://purl.obolibrary.org/obo/HP_".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HtsFile {
    pub uri: String,
    pub hts_format: String,
    pub genome_assembly: String,
}

/// Format a timestamp the way the phenopacket `created` field expects
pub fn format_created(created: DateTime<Utc>) -> String {
    created.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Build the phenopacket structure for one subject
pub fn build(
    record: &SubjectRecord<'_>,
    creator: &str,
    created: DateTime<Utc>,
    vcf_uri_prefix: &str,
) -> Phenopacket {
    let phenotypic_features = record
        .hpo_terms
        .iter()
        .filter(|term| !term.id.trim().is_empty())
        .map(|term| PhenotypicFeature {
            term: OntologyClass {
                id: term.id.clone(),
                label: term.label.clone(),
            },
        })
        .collect();

    let hts_files = record.vcf_file_path.map(|path| {
        let basename = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        let prefix = vcf_uri_prefix.trim_end_matches('/');
        let uri = if prefix.is_empty() {
            basename
        } else {
            format!("{}/{}", prefix, basename)
        };

        vec![HtsFile {
            uri,
            hts_format: "VCF".to_string(),
            // Uploaded VCFs are assumed GRCh37 regardless of the analysis build
            genome_assembly: "hg19".to_string(),
        }]
    });

    Phenopacket {
        id: record.identity.to_string(),
        subject: Subject {
            id: record.identity.to_string(),
            sex: record.sex.phenopacket_sex().to_string(),
            age: record.age_years.map(|years| Age {
                age: format!("{}Y", years),
            }),
        },
        phenotypic_features,
        meta_data: MetaData {
            created: format_created(created),
            created_by: creator.to_string(),
            resources: vec![Resource::hpo()],
            phenopacket_schema_version: SCHEMA_VERSION.to_string(),
        },
        hts_files,
    }
}

/// Generate phenopacket YAML for a subject at a fixed timestamp
pub fn generate_phenopacket_yaml(
    record: &SubjectRecord<'_>,
    creator: &str,
    created: DateTime<Utc>,
    vcf_uri_prefix: &str,
) -> Result<String> {
    let phenopacket = build(record, creator, created, vcf_uri_prefix);
    Ok(serde_yaml::to_string(&phenopacket)?)
}

/// Fresh phenopacket YAML for a stored individual, stamped now
pub fn for_individual(individual: &Individual, vcf_uri_prefix: &str) -> Result<String> {
    generate_phenopacket_yaml(
        &SubjectRecord::from(individual),
        DEFAULT_CREATOR,
        Utc::now(),
        vcf_uri_prefix,
    )
}
