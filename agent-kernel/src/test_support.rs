//! Scripted model and insurance catalog shared by kernel tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_adapters::traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk,
    InferenceRequest, ModelAdapter, ToolCallRequest,
};
use agent_primitives::{ParameterSpec, ToolId, TypeHint};
use agent_tools::{ToolArguments, ToolArgumentsExt, ToolCatalog, ToolDescriptor, ToolError};
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use crate::resolver::CapabilityResolver;

pub(crate) struct ScriptedAdapter {
    metadata: AdapterMetadata,
    turns: Mutex<VecDeque<AdapterResult<InferenceChunk>>>,
    repeat: Option<InferenceChunk>,
    delay: Option<Duration>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedAdapter {
    pub(crate) fn new<I>(turns: I) -> Arc<Self>
    where
        I: IntoIterator<Item = AdapterResult<InferenceChunk>>,
    {
        Arc::new(Self {
            metadata: AdapterMetadata::new("scripted", "scripted-model"),
            turns: Mutex::new(turns.into_iter().collect()),
            repeat: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn looping(turn: InferenceChunk) -> Arc<Self> {
        Arc::new(Self {
            metadata: AdapterMetadata::new("scripted", "scripted-model"),
            turns: Mutex::new(VecDeque::new()),
            repeat: Some(turn),
            delay: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let mut adapter = Arc::into_inner(self).unwrap();
        adapter.delay = Some(delay);
        Arc::new(adapter)
    }

    pub(crate) fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.turns.lock().unwrap().pop_front();
        let chunk = match (next, &self.repeat) {
            (Some(turn), _) => turn?,
            (None, Some(repeat)) => repeat.clone(),
            (None, None) => return Err(AdapterError::response("script exhausted")),
        };
        Ok(Box::pin(stream::once(async move { Ok(chunk) })))
    }
}

pub(crate) fn text(content: &str) -> InferenceChunk {
    InferenceChunk::new(content, true)
}

pub(crate) fn call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, arguments.to_string())
}

fn parameter(name: &str) -> ParameterSpec {
    ParameterSpec::new(name, TypeHint::String).unwrap()
}

fn fixed(id: &str, name: &str, description: &str, param: &str, answer: &'static str) -> ToolDescriptor {
    ToolDescriptor::builder(ToolId::new(id).unwrap(), name)
        .description(description)
        .parameter(parameter(param))
        .executor(move |_args: ToolArguments| async move { Ok::<_, ToolError>(answer.to_owned()) })
        .build()
        .unwrap()
}

pub(crate) fn insurance_catalog(writes: Arc<AtomicUsize>) -> ToolCatalog {
    let read_file = ToolDescriptor::builder(ToolId::new("read-file").unwrap(), "read_file")
        .description("read the content of a file")
        .parameter(parameter("file_path"))
        .executor(|args: ToolArguments| async move {
            let path = args.required_str("file_path")?.to_owned();
            Err::<String, _>(ToolError::execution(format!("no such file: {path}")))
        })
        .build()
        .unwrap();

    let save_to_file = ToolDescriptor::builder(ToolId::new("save-to-file").unwrap(), "save_to_file")
        .description("save the content to a file")
        .parameter(parameter("file_path"))
        .parameter(parameter("content"))
        .executor(move |_args: ToolArguments| {
            let writes = Arc::clone(&writes);
            async move {
                writes.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ToolError>("success".to_owned())
            }
        })
        .build()
        .unwrap();

    ToolCatalog::builder()
        .with(read_file)
        .with(save_to_file)
        .with(fixed(
            "account",
            "get_health_insurance_account",
            "get the account number of the health insurance account of the user.",
            "user",
            "A12345",
        ))
        .with(fixed(
            "policy",
            "get_health_insurance_policy",
            "get the policy number of the health insurance account of the user.",
            "account",
            "P56789",
        ))
        .with(fixed(
            "benefits",
            "get_policy_benefits",
            "get the policy benefits of a user.",
            "policy",
            "inpatient, outpatient, emergency",
        ))
        .build()
        .unwrap()
}

pub(crate) async fn insurance_resolver() -> CapabilityResolver {
    insurance_resolver_with_writes().await.0
}

pub(crate) async fn insurance_resolver_with_writes() -> (CapabilityResolver, Arc<AtomicUsize>) {
    let writes = Arc::new(AtomicUsize::new(0));
    let catalog = Arc::new(insurance_catalog(Arc::clone(&writes)));
    let resolver = CapabilityResolver::lexical(catalog).await.unwrap();
    (resolver, writes)
}
