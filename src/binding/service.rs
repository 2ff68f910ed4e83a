//! Entry points used by request handlers: update an existing model in place
//! or bind a list of action parameters.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use metrics::histogram;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::metadata::{BinderMarker, BindingSource, ModelMetadata, ModelMetadataProvider};
use crate::validation::{ActivationError, ExcludeFilterOptions, ExcludeFilters, ModelValidator};

use super::binders::CompositeModelBinder;
use super::body::BodyModelReader;
use super::context::{
    BindingOptions, ModelBindingContext, ModelBindingResult, OperationBindingContext,
    PropertyFilter,
};
use super::error::BindingError;
use super::model_state::ModelStateDictionary;
use super::value_provider::CompositeValueProvider;

const METRIC_BINDING_MS: &str = "mvcore_model_binding_ms";

/// Request inputs for one bind: value providers plus an optional body.
#[derive(Clone, Default)]
pub struct BindingSources {
    value_provider: Arc<CompositeValueProvider>,
    body: Option<Arc<dyn BodyModelReader>>,
}

impl fmt::Debug for BindingSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingSources")
            .field("value_provider", &self.value_provider)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

impl BindingSources {
    pub fn new(value_provider: CompositeValueProvider) -> Self {
        Self {
            value_provider: Arc::new(value_provider),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl BodyModelReader + 'static) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn value_provider(&self) -> &CompositeValueProvider {
        &self.value_provider
    }
}

/// An action parameter: its name doubles as the binding prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    name: String,
    type_name: String,
    marker: Option<BinderMarker>,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            marker: None,
        }
    }

    pub fn with_marker(mut self, marker: BinderMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn marker(&self) -> Option<&BinderMarker> {
        self.marker.as_ref()
    }
}

/// Bound action arguments in parameter order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionArguments {
    values: IndexMap<String, Value>,
    succeeded: bool,
}

impl ActionArguments {
    /// False when some parameter had no binder able to handle it.
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> IndexMap<String, Value> {
        self.values
    }
}

/// Binds and validates models against one metadata provider.
pub struct ModelBindingService {
    metadata_provider: Arc<dyn ModelMetadataProvider>,
    binder: CompositeModelBinder,
    validator: ModelValidator,
    options: BindingOptions,
}

impl ModelBindingService {
    pub fn new(metadata_provider: Arc<dyn ModelMetadataProvider>) -> Self {
        let options = BindingOptions::default();
        let validator =
            ModelValidator::new(Arc::clone(&metadata_provider), ExcludeFilters::empty())
                .with_max_depth(options.max_depth);
        Self {
            metadata_provider,
            binder: CompositeModelBinder::default(),
            validator,
            options,
        }
    }

    /// Activate the exclude registrations and build a service around them.
    pub fn configure(
        metadata_provider: Arc<dyn ModelMetadataProvider>,
        options: BindingOptions,
        exclude: &ExcludeFilterOptions,
    ) -> Result<Self, ActivationError> {
        let filters = exclude.activate(metadata_provider.as_ref())?;
        Ok(Self::new(metadata_provider)
            .with_options(options)
            .with_exclude_filters(filters))
    }

    pub fn with_options(mut self, options: BindingOptions) -> Self {
        self.validator = self.validator.with_max_depth(options.max_depth);
        self.options = options;
        self
    }

    pub fn with_exclude_filters(mut self, filters: ExcludeFilters) -> Self {
        self.validator = ModelValidator::new(Arc::clone(&self.metadata_provider), filters)
            .with_max_depth(self.options.max_depth);
        self
    }

    pub fn options(&self) -> &BindingOptions {
        &self.options
    }

    pub fn validator(&self) -> &ModelValidator {
        &self.validator
    }

    /// Bind request values into `model`, then validate it.
    ///
    /// `Ok(true)` means a binder handled the root and model state holds no
    /// errors. Conversion and validation problems land in `model_state`;
    /// metadata and depth failures are returned as errors.
    pub async fn try_update_model(
        &self,
        model: &mut Value,
        type_name: &str,
        prefix: &str,
        filter: PropertyFilter,
        sources: &BindingSources,
        model_state: &mut ModelStateDictionary,
    ) -> Result<bool, BindingError> {
        let started_at = Instant::now();
        let metadata = self.metadata_provider.metadata_for_type(type_name)?;
        let marker = metadata.class_marker().cloned();
        let prefix = self.effective_prefix(prefix, &metadata, marker.as_ref(), sources);
        let existing = (!model.is_null()).then(|| model.clone());

        let bound = self
            .bind_top_level(
                &metadata,
                prefix,
                prefix,
                marker,
                existing,
                filter,
                sources,
                model_state,
            )
            .await?;

        let result = match bound {
            None => false,
            Some(result) => {
                if let ModelBindingResult::Bound(value) = result {
                    *model = value;
                }
                self.validator
                    .validate(model, &metadata, prefix, model_state)?;
                model_state.is_valid()
            }
        };

        histogram!(METRIC_BINDING_MS, "op" => "try_update_model")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(
            model_type = type_name,
            prefix,
            result,
            errors = model_state.error_count(),
            "Model update complete"
        );
        Ok(result)
    }

    /// Typed variant of [`Self::try_update_model`]; the model round-trips
    /// through its serde representation.
    pub async fn try_update<T>(
        &self,
        model: &mut T,
        type_name: &str,
        prefix: &str,
        filter: PropertyFilter,
        sources: &BindingSources,
        model_state: &mut ModelStateDictionary,
    ) -> Result<bool, BindingError>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut value = serde_json::to_value(&*model)
            .map_err(|err| BindingError::serialization(type_name, err))?;
        let result = self
            .try_update_model(&mut value, type_name, prefix, filter, sources, model_state)
            .await?;
        *model = serde_json::from_value(value)
            .map_err(|err| BindingError::serialization(type_name, err))?;
        Ok(result)
    }

    /// Bind one parameter without validating it.
    pub async fn bind_model(
        &self,
        parameter: &ParameterDescriptor,
        sources: &BindingSources,
        model_state: &mut ModelStateDictionary,
    ) -> Result<ModelBindingResult, BindingError> {
        let metadata = self
            .metadata_provider
            .metadata_for_type(parameter.type_name())?;
        let marker = parameter
            .marker()
            .or_else(|| metadata.class_marker())
            .cloned();
        let prefix = self.effective_prefix(parameter.name(), &metadata, marker.as_ref(), sources);
        let operation = self.operation(sources);
        let context = self.root_context(
            &operation,
            &metadata,
            prefix,
            parameter.name(),
            marker,
            None,
            PropertyFilter::default(),
        );
        self.binder.bind(&context, &operation, model_state).await
    }

    /// Bind and validate every parameter in order.
    ///
    /// Parameters nothing could bind get their type default; a parameter
    /// without a suitable binder marks the whole call as failed.
    pub async fn bind_arguments(
        &self,
        parameters: &[ParameterDescriptor],
        sources: &BindingSources,
        model_state: &mut ModelStateDictionary,
    ) -> Result<ActionArguments, BindingError> {
        let started_at = Instant::now();
        let mut arguments = ActionArguments {
            values: IndexMap::with_capacity(parameters.len()),
            succeeded: true,
        };

        for parameter in parameters {
            let metadata = self
                .metadata_provider
                .metadata_for_type(parameter.type_name())?;
            let marker = parameter
                .marker()
                .or_else(|| metadata.class_marker())
                .cloned();
            let prefix =
                self.effective_prefix(parameter.name(), &metadata, marker.as_ref(), sources);

            let bound = self
                .bind_top_level(
                    &metadata,
                    prefix,
                    parameter.name(),
                    marker,
                    None,
                    PropertyFilter::default(),
                    sources,
                    model_state,
                )
                .await?;

            match bound {
                None => arguments.succeeded = false,
                Some(ModelBindingResult::Bound(value)) => {
                    self.validator
                        .validate(&value, &metadata, prefix, model_state)?;
                    arguments.values.insert(parameter.name().to_string(), value);
                }
                Some(ModelBindingResult::NotBound) => {
                    arguments
                        .values
                        .insert(parameter.name().to_string(), metadata.default_value());
                }
            }
        }

        histogram!(METRIC_BINDING_MS, "op" => "bind_arguments")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(
            parameters = parameters.len(),
            succeeded = arguments.succeeded,
            errors = model_state.error_count(),
            "Action arguments bound"
        );
        Ok(arguments)
    }

    /// `None` when no binder could handle some node of the tree.
    #[allow(clippy::too_many_arguments)]
    async fn bind_top_level(
        &self,
        metadata: &Arc<ModelMetadata>,
        prefix: &str,
        field_name: &str,
        marker: Option<BinderMarker>,
        existing: Option<Value>,
        filter: PropertyFilter,
        sources: &BindingSources,
        model_state: &mut ModelStateDictionary,
    ) -> Result<Option<ModelBindingResult>, BindingError> {
        let operation = self.operation(sources);
        let context = self.root_context(
            &operation,
            metadata,
            prefix,
            field_name,
            marker,
            existing,
            filter,
        );
        match self.binder.bind(&context, &operation, model_state).await {
            Ok(result) => Ok(Some(result)),
            Err(err) if err.is_binder_not_found() => {
                warn!(
                    model_name = prefix,
                    model_type = metadata.full_name(),
                    error = %err,
                    "Model binding failed"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn operation<'a>(&'a self, sources: &'a BindingSources) -> OperationBindingContext<'a> {
        OperationBindingContext {
            metadata_provider: self.metadata_provider.as_ref(),
            value_provider: Arc::clone(&sources.value_provider),
            body_reader: sources.body.as_deref(),
            binder: &self.binder,
            options: &self.options,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn root_context(
        &self,
        operation: &OperationBindingContext<'_>,
        metadata: &Arc<ModelMetadata>,
        prefix: &str,
        field_name: &str,
        marker: Option<BinderMarker>,
        existing: Option<Value>,
        filter: PropertyFilter,
    ) -> ModelBindingContext {
        let value_provider = operation.scoped_provider(marker.as_ref(), &operation.value_provider);
        ModelBindingContext {
            model_name: prefix.to_string(),
            field_name: field_name.to_string(),
            metadata: Arc::clone(metadata),
            model: existing,
            marker,
            value_provider,
            property_filter: filter,
            is_top_level: true,
            depth: 0,
        }
    }

    /// Non-scalar roots read from providers fall back to the empty prefix
    /// when nothing is posted under their own name.
    fn effective_prefix<'p>(
        &self,
        prefix: &'p str,
        metadata: &ModelMetadata,
        marker: Option<&BinderMarker>,
        sources: &BindingSources,
    ) -> &'p str {
        if prefix.is_empty()
            || !self.options.fallback_to_empty_prefix
            || metadata.scalar_kind().is_some()
        {
            return prefix;
        }
        let source = marker.and_then(BinderMarker::source);
        if matches!(source, Some(BindingSource::Body | BindingSource::Header)) {
            return prefix;
        }
        let scoped = match source {
            Some(source) => sources.value_provider.filtered(source),
            None => (*sources.value_provider).clone(),
        };
        if scoped.contains_prefix(prefix) {
            prefix
        } else {
            ""
        }
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue};
    use serde::Deserialize;
    use serde_json::json;

    use crate::binding::{DictionaryValueProvider, ModelValidationState};
    use crate::metadata::{PropertyMetadata, TypeDefinition, TypeRegistry, builtin};

    use super::*;

    fn service() -> ModelBindingService {
        let registry = TypeRegistry::builder()
            .register(
                TypeDefinition::complex("Person")
                    .property(PropertyMetadata::new("Name", builtin::STRING).required())
                    .property(PropertyMetadata::new("Age", builtin::INT))
                    .property(PropertyMetadata::new("Address", "Address")),
            )
            .register(
                TypeDefinition::complex("Address")
                    .property(PropertyMetadata::new("City", builtin::STRING)),
            )
            .build()
            .expect("registry");
        ModelBindingService::new(Arc::new(registry))
    }

    fn query(query: &str) -> BindingSources {
        BindingSources::new(
            CompositeValueProvider::new().with(DictionaryValueProvider::from_query(query)),
        )
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Person {
        name: String,
        age: i64,
        address: Option<Address>,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Address {
        city: String,
    }

    #[tokio::test]
    async fn typed_update_binds_prefixed_values() {
        let service = service();
        let mut person = Person::default();
        let mut state = ModelStateDictionary::new();

        let ok = service
            .try_update(
                &mut person,
                "Person",
                "person",
                PropertyFilter::default(),
                &query("person.Name=Ann&person.Age=41&person.Address.City=Oslo"),
                &mut state,
            )
            .await
            .expect("bind");

        assert!(ok);
        assert_eq!(
            person,
            Person {
                name: "Ann".to_string(),
                age: 41,
                address: Some(Address {
                    city: "Oslo".to_string()
                }),
            }
        );
        assert_eq!(
            state.field_validation_state("person.Name"),
            ModelValidationState::Valid
        );
    }

    #[tokio::test]
    async fn falls_back_to_empty_prefix() {
        let service = service();
        let mut model = json!({ "Name": "", "Age": 0, "Address": null });
        let mut state = ModelStateDictionary::new();

        let ok = service
            .try_update_model(
                &mut model,
                "Person",
                "person",
                PropertyFilter::default(),
                &query("Name=Bo&Age=x"),
                &mut state,
            )
            .await
            .expect("bind");

        assert!(!ok);
        assert_eq!(model["Name"], "Bo");
        assert_eq!(model["Age"], 0);
        assert!(model["Address"].is_null());
        let entry = state.get("Age").expect("age entry");
        assert_eq!(entry.attempted_value(), Some("x"));
        assert_eq!(
            entry.errors()[0].message(),
            "The value 'x' is not valid for Age."
        );
    }

    #[tokio::test]
    async fn arguments_bind_from_their_own_sources() {
        let service = service();
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));
        let sources = BindingSources::new(
            CompositeValueProvider::new()
                .with(DictionaryValueProvider::from_route([("id", "7")]))
                .with(DictionaryValueProvider::from_headers(&headers)),
        );
        let parameters = [
            ParameterDescriptor::new("id", builtin::INT),
            ParameterDescriptor::new("agent", builtin::STRING)
                .with_marker(BinderMarker::from_header("User-Agent")),
            ParameterDescriptor::new("page", builtin::INT),
        ];
        let mut state = ModelStateDictionary::new();

        let arguments = service
            .bind_arguments(&parameters, &sources, &mut state)
            .await
            .expect("bind");

        assert!(arguments.succeeded());
        assert_eq!(arguments.get("id"), Some(&json!(7)));
        assert_eq!(arguments.get("agent"), Some(&json!("curl/8.0")));
        assert_eq!(arguments.get("page"), Some(&json!(0)));
        assert!(state.is_valid());
    }

    #[tokio::test]
    async fn header_marker_on_complex_parameter_fails_the_bind() {
        let service = service();
        let parameters = [
            ParameterDescriptor::new("who", "Person").with_marker(BinderMarker::from_header("X")),
            ParameterDescriptor::new("id", builtin::INT),
        ];
        let mut state = ModelStateDictionary::new();

        let arguments = service
            .bind_arguments(&parameters, &query("id=3"), &mut state)
            .await
            .expect("bind");

        assert!(!arguments.succeeded());
        assert!(arguments.get("who").is_none());
        assert_eq!(arguments.get("id"), Some(&json!(3)));

        let err = service
            .bind_model(&parameters[0], &query(""), &mut state)
            .await
            .expect_err("no binder");
        assert!(err.is_binder_not_found());
    }

    #[tokio::test]
    async fn unknown_types_are_fatal() {
        let service = service();
        let mut model = Value::Null;
        let mut state = ModelStateDictionary::new();

        let err = service
            .try_update_model(
                &mut model,
                "Missing",
                "",
                PropertyFilter::default(),
                &query(""),
                &mut state,
            )
            .await
            .expect_err("unknown type");
        assert!(matches!(err, BindingError::Metadata(_)));
    }
}
