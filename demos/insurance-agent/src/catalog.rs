//! Mock health-insurance capabilities.

use std::path::{Path, PathBuf};

use agent_primitives::{ParameterSpec, ToolId, TypeHint};
use agent_tools::{
    ToolArguments, ToolArgumentsExt, ToolCatalog, ToolDescriptor, ToolError, ToolResult,
};
use anyhow::Result;
use tracing::info;

/// File read by `get_policy_benefits`, relative to the documents directory.
pub const BENEFITS_DOCUMENT: &str = "Northwind_Standard_Benefits_Details.txt";

const POLICY_SUMMARY: &str = "policy summary:
Inpatient Hospitalization: Covers hospital stays, including room charges, nursing care, and all related medical services.
Outpatient Services: Includes doctor visits, specialist consultations, and outpatient procedures.
Emergency Services: Covers emergency room visits and ambulance services.
Prescription Drugs: Provides coverage for prescribed medications, including both generic and brand-name drugs.
Preventive Care: Covers routine check-ups, screenings, immunizations, and other preventive services at no extra cost.
Maternity and Newborn Care: Includes prenatal care, labor, delivery, and care for the newborn baby.
Mental Health and Substance Use Disorder Services: Offers coverage for mental health services and treatments for substance use disorders.
Rehabilitation Services: Covers physical therapy, occupational therapy, and other rehabilitation services.
Laboratory Services: Provides coverage for diagnostic tests, blood work, and other laboratory services.
Pediatric Services: Includes healthcare services for children, such as dental and vision care.";

fn text_param(name: &str, description: &str) -> Result<ParameterSpec> {
    Ok(ParameterSpec::new(name, TypeHint::String)?.with_description(description))
}

async fn read_text(path: &Path) -> ToolResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ToolError::execution(format!("cannot read {}: {err}", path.display())))
}

/// Builds the catalog. `documents` is where policy documents live.
///
/// # Errors
///
/// Fails if a descriptor is malformed.
pub fn insurance_catalog(documents: PathBuf) -> Result<ToolCatalog> {
    let read_file = ToolDescriptor::builder(ToolId::new("read-file")?, "read_file")
        .description("read the content of a file")
        .parameter(text_param("file_path", "path to the file")?)
        .executor(|args: ToolArguments| async move {
            let path = PathBuf::from(args.required_str("file_path")?);
            read_text(&path).await
        })
        .build()?;

    let save_to_file = ToolDescriptor::builder(ToolId::new("save-to-file")?, "save_to_file")
        .description("save the content to a file")
        .parameter(text_param("file_path", "path to the file")?)
        .parameter(text_param("content", "content to save")?)
        .executor(|args: ToolArguments| async move {
            let path = args.required_str("file_path")?.to_owned();
            let content = args.required_str("content")?.to_owned();
            tokio::fs::write(&path, content)
                .await
                .map_err(|err| ToolError::execution(format!("cannot write {path}: {err}")))?;
            info!(path = %path, "saved file");
            Ok::<_, ToolError>("success".to_owned())
        })
        .build()?;

    let account = ToolDescriptor::builder(
        ToolId::new("health-insurance-account")?,
        "get_health_insurance_account",
    )
        .description("get the account number of the health insurance account of the user.")
        .parameter(text_param("user", "user name")?)
        .executor(|_args: ToolArguments| async move { Ok::<_, ToolError>("A12345".to_owned()) })
        .build()?;

    let policy = ToolDescriptor::builder(
        ToolId::new("health-insurance-policy")?,
        "get_health_insurance_policy",
    )
        .description("get the policy number of the health insurance account of the user.")
        .parameter(text_param("account", "account number e.g. A12345")?)
        .executor(|_args: ToolArguments| async move { Ok::<_, ToolError>("P56789".to_owned()) })
        .build()?;

    let benefits_path = documents.join(BENEFITS_DOCUMENT);
    let benefits = ToolDescriptor::builder(ToolId::new("policy-benefits")?, "get_policy_benefits")
        .description("get the policy benefits of a user.")
        .parameter(text_param("policy", "policy number e.g. P56789")?)
        .executor(move |_args: ToolArguments| {
            let path = benefits_path.clone();
            async move { read_text(&path).await }
        })
        .build()?;

    let summarize = ToolDescriptor::builder(
        ToolId::new("summarize-policy")?,
        "summarize_policy_content",
    )
        .description("summarize the policy content.")
        .parameter(text_param("content_file_path", "path to policy content file")?)
        .executor(|_args: ToolArguments| async move {
            Ok::<_, ToolError>(POLICY_SUMMARY.to_owned())
        })
        .build()?;

    let careproviders = ToolDescriptor::builder(
        ToolId::new("find-careproviders")?,
        "find_careproviders",
    )
        .description("find care providers near a location.")
        .parameter(text_param("provider_type", "type of care provider")?)
        .parameter(text_param("location", "location e.g. zip code")?)
        .executor(|_args: ToolArguments| async move {
            Ok::<_, ToolError>("Dr. Smith, Dr. Jones, Dr. Brown".to_owned())
        })
        .build()?;

    Ok(ToolCatalog::builder()
        .with(read_file)
        .with(save_to_file)
        .with(account)
        .with(policy)
        .with(benefits)
        .with(summarize)
        .with(careproviders)
        .build()?)
}
