//! Resource schema definitions

use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

fn string(name: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String)
}

fn labels() -> AttributeSchema {
    AttributeSchema::new("labels", AttributeType::map(AttributeType::String))
}

/// `create`, `update` and `state` of API gateway resources
fn lifecycle_attrs(schema: ResourceSchema) -> ResourceSchema {
    schema
        .attr(string("create").with_description("Creation time"))
        .attr(string("update").with_description("Last update time"))
        .attr(string("state"))
}

pub fn bucket_schema() -> ResourceSchema {
    ResourceSchema::new("bucket")
        .with_description("A Cloud Storage bucket")
        .identifier(string("project"))
        .identifier(string("location"))
        .identifier(string("name"))
        .config(labels())
        .attr(string("created"))
}

pub fn bucket_object_schema() -> ResourceSchema {
    ResourceSchema::new("bucket_object")
        .with_description("An object stored in a bucket")
        .identifier(AttributeSchema::new("bucket", AttributeType::Identifier))
        .identifier(string("name"))
        .config(
            AttributeSchema::new("contents", AttributeType::File)
                .with_description("Local file uploaded as the object contents"),
        )
        .attr(string("created"))
}

pub fn function_schema() -> ResourceSchema {
    ResourceSchema::new("function")
        .with_description("A 2nd gen Cloud Function")
        .identifier(string("project"))
        .identifier(string("location"))
        .identifier(string("name"))
        .config(string("description"))
        .config(labels())
        .config(AttributeSchema::new(
            "build_config",
            AttributeType::Struct(vec![
                string("runtime"),
                string("entrypoint"),
                AttributeSchema::new("source", AttributeType::File)
                    .with_description("Zip archive of the function source"),
            ]),
        ))
        .attr(string("url").with_description("HTTPS trigger URL"))
}

pub fn service_account_schema() -> ResourceSchema {
    ResourceSchema::new("service_account")
        .with_description("A user-managed service account")
        .identifier(string("project"))
        .identifier(string("account_id"))
        .config(string("display_name"))
        .config(string("description"))
        .attr(string("unique_id"))
        .attr(AttributeSchema::new("disabled", AttributeType::Bool))
}

pub fn api_schema() -> ResourceSchema {
    let schema = ResourceSchema::new("api")
        .with_description("An API managed by API Gateway")
        .identifier(string("project"))
        .identifier(string("api_id"))
        .config(string("display_name"))
        .config(labels());
    lifecycle_attrs(schema)
}

pub fn api_config_schema() -> ResourceSchema {
    let schema = ResourceSchema::new("api_config")
        .with_description("OpenAPI documents served for an API")
        .identifier(AttributeSchema::new("api", AttributeType::Identifier))
        .identifier(string("api_config_id"))
        .config(string("display_name"))
        .config(AttributeSchema::new(
            "open_api_documents",
            AttributeType::list(AttributeType::File),
        ));
    lifecycle_attrs(schema)
}

pub fn api_gateway_schema() -> ResourceSchema {
    let schema = ResourceSchema::new("api_gateway")
        .with_description("A gateway serving one api config")
        .identifier(string("project"))
        .identifier(string("location"))
        .identifier(string("gateway_id"))
        .config(labels())
        .config(string("display_name"))
        .config(AttributeSchema::new("api_config", AttributeType::Identifier));
    lifecycle_attrs(schema).attr(string("default_hostname"))
}

pub fn iam_role_schema() -> ResourceSchema {
    ResourceSchema::new("iam_role")
        .with_description("A predefined IAM role (read only)")
        .identifier(string("name"))
        .attr(string("title"))
        .attr(string("description"))
        .attr(string("stage"))
        .attr(string("etag"))
        .attr(AttributeSchema::new(
            "permissions",
            AttributeType::list(AttributeType::String),
        ))
}

pub fn iam_role_custom_project_schema() -> ResourceSchema {
    ResourceSchema::new("iam_role_custom_project")
        .with_description("A custom IAM role defined in a project")
        .identifier(string("project"))
        .identifier(string("name"))
        .config(string("title"))
        .config(string("description"))
        .config(AttributeSchema::new(
            "permissions",
            AttributeType::list(AttributeType::String),
        ))
        .config(
            string("stage")
                .with_description("ALPHA, BETA, GA, DEPRECATED, DISABLED or EAP"),
        )
        .attr(AttributeSchema::new("deleted", AttributeType::Bool))
        .attr(string("etag"))
}

pub fn iam_policy_schema() -> ResourceSchema {
    ResourceSchema::new("iam_policy")
        .with_description("Access policy of a governable resource")
        .identifier(
            AttributeSchema::new("resource", AttributeType::Identifier)
                .with_description("Resource the policy is attached to"),
        )
        .config(AttributeSchema::new(
            "bindings",
            AttributeType::list(AttributeType::Struct(vec![
                AttributeSchema::new("role", AttributeType::Identifier),
                AttributeSchema::new("members", AttributeType::list(AttributeType::Identifier)),
            ])),
        ))
        .attr(string("etag"))
}

/// Returns all schemas, one per resource type
pub fn all() -> Vec<ResourceSchema> {
    vec![
        bucket_schema(),
        bucket_object_schema(),
        function_schema(),
        service_account_schema(),
        api_schema(),
        api_config_schema(),
        api_gateway_schema(),
        iam_role_schema(),
        iam_role_custom_project_schema(),
        iam_policy_schema(),
    ]
}
