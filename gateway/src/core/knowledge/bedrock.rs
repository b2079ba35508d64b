//! Managed knowledge base backed by Amazon Bedrock Retrieve-and-Generate.
//!
//! The SDK client is created on the first query. Explicit credentials are used
//! when configured; otherwise the default AWS credential chain applies
//! (environment, shared profile, instance role).

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_bedrockagentruntime::Client as AgentRuntimeClient;
use aws_sdk_bedrockagentruntime::config::Builder as AgentRuntimeConfigBuilder;
use aws_sdk_bedrockagentruntime::error::DisplayErrorContext;
use aws_sdk_bedrockagentruntime::types::{
    GenerationConfiguration, InferenceConfig, KnowledgeBaseRetrievalConfiguration,
    KnowledgeBaseRetrieveAndGenerateConfiguration, KnowledgeBaseVectorSearchConfiguration,
    RetrieveAndGenerateConfiguration, RetrieveAndGenerateInput, RetrieveAndGenerateType,
    TextInferenceConfig,
};
use aws_types::region::Region;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{KnowledgeError, KnowledgeResolver, KnowledgeResult};

/// Foundation model used to generate answers from retrieved passages
pub const DEFAULT_MODEL_ARN: &str =
    "arn:aws:bedrock:us-east-1::foundation-model/amazon.nova-pro-v1:0";

/// Answer returned when the service produces no text
pub const NO_ANSWER_FOUND: &str = "No answer was found in the knowledge base.";

const DEFAULT_NUMBER_OF_RESULTS: i32 = 5;
const GENERATION_MAX_TOKENS: i32 = 512;
const GENERATION_TOP_P: f32 = 0.9;

fn request_error(err: impl std::fmt::Display) -> KnowledgeError {
    KnowledgeError::Request(err.to_string())
}

/// Retrieve-and-generate client for one knowledge base.
#[derive(Clone)]
pub struct BedrockKnowledgeBase {
    knowledge_base_id: String,
    model_arn: String,
    region: String,
    credentials: Option<Credentials>,
    number_of_results: i32,
    client: Arc<OnceCell<AgentRuntimeClient>>,
}

impl BedrockKnowledgeBase {
    pub fn new(knowledge_base_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            knowledge_base_id: knowledge_base_id.into(),
            model_arn: DEFAULT_MODEL_ARN.to_string(),
            region: region.into(),
            credentials: None,
            number_of_results: DEFAULT_NUMBER_OF_RESULTS,
            client: Arc::new(OnceCell::new()),
        }
    }

    pub fn with_model_arn(mut self, model_arn: impl Into<String>) -> Self {
        self.model_arn = model_arn.into();
        self
    }

    /// Use a static access key instead of the default credential chain.
    pub fn with_credentials(mut self, access_key_id: &str, secret_access_key: &str) -> Self {
        self.credentials = Some(Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "voicekb",
        ));
        self
    }

    pub fn with_number_of_results(mut self, number_of_results: i32) -> Self {
        self.number_of_results = number_of_results.max(1);
        self
    }

    pub fn knowledge_base_id(&self) -> &str {
        &self.knowledge_base_id
    }

    pub fn model_arn(&self) -> &str {
        &self.model_arn
    }

    pub fn has_explicit_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    async fn client(&self) -> &AgentRuntimeClient {
        self.client
            .get_or_init(|| async {
                let region = Region::new(self.region.clone());
                if let Some(credentials) = &self.credentials {
                    let config = AgentRuntimeConfigBuilder::new()
                        .behavior_version(BehaviorVersion::latest())
                        .region(region)
                        .credentials_provider(credentials.clone())
                        .build();
                    AgentRuntimeClient::from_conf(config)
                } else {
                    let shared = aws_config::defaults(BehaviorVersion::latest())
                        .region(region)
                        .load()
                        .await;
                    AgentRuntimeClient::new(&shared)
                }
            })
            .await
    }

    fn build_configuration(&self) -> KnowledgeResult<RetrieveAndGenerateConfiguration> {
        let retrieval = KnowledgeBaseRetrievalConfiguration::builder()
            .vector_search_configuration(
                KnowledgeBaseVectorSearchConfiguration::builder()
                    .number_of_results(self.number_of_results)
                    .build(),
            )
            .build();

        let generation = GenerationConfiguration::builder()
            .inference_config(
                InferenceConfig::builder()
                    .text_inference_config(
                        TextInferenceConfig::builder()
                            .temperature(0.0)
                            .top_p(GENERATION_TOP_P)
                            .max_tokens(GENERATION_MAX_TOKENS)
                            .build(),
                    )
                    .build(),
            )
            .build();

        let knowledge_base = KnowledgeBaseRetrieveAndGenerateConfiguration::builder()
            .knowledge_base_id(&self.knowledge_base_id)
            .model_arn(&self.model_arn)
            .retrieval_configuration(retrieval)
            .generation_configuration(generation)
            .build()
            .map_err(request_error)?;

        RetrieveAndGenerateConfiguration::builder()
            .r#type(RetrieveAndGenerateType::KnowledgeBase)
            .knowledge_base_configuration(knowledge_base)
            .build()
            .map_err(request_error)
    }
}

#[async_trait]
impl KnowledgeResolver for BedrockKnowledgeBase {
    async fn resolve(&self, query: &str) -> KnowledgeResult<String> {
        if self.knowledge_base_id.is_empty() {
            return Err(KnowledgeError::NotConfigured(
                "knowledge base id is empty".into(),
            ));
        }

        let input = RetrieveAndGenerateInput::builder()
            .text(query)
            .build()
            .map_err(request_error)?;
        let configuration = self.build_configuration()?;

        debug!(
            knowledge_base_id = %self.knowledge_base_id,
            "Querying knowledge base: {} chars",
            query.len()
        );

        let response = self
            .client()
            .await
            .retrieve_and_generate()
            .input(input)
            .retrieve_and_generate_configuration(configuration)
            .send()
            .await
            .map_err(|e| KnowledgeError::Request(DisplayErrorContext(&e).to_string()))?;

        let answer = response
            .output()
            .map(|output| output.text().trim().to_string())
            .filter(|text| !text.is_empty());

        match answer {
            Some(text) => {
                info!(
                    knowledge_base_id = %self.knowledge_base_id,
                    "Knowledge base answered with {} chars",
                    text.len()
                );
                Ok(text)
            }
            None => Ok(NO_ANSWER_FOUND.to_string()),
        }
    }
}
