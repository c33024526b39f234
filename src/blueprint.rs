//! Client-facing descriptions of the unified schema: the per-type model and an OpenAPI 3 document.

use crate::action::ActionEngine;
use crate::registry::{IncludeDirection, Resource, ResourceRegistry};
use crate::schema::ColumnType;
use crate::tracking::{StateMachineDescription, StateMachineManager};
use serde::Serialize;
use utoipa::openapi::path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder, PathsBuilder};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::{Array, KnownFormat, ObjectBuilder, Schema, SchemaFormat, SchemaType, Type};
use utoipa::openapi::{
    ComponentsBuilder, ContentBuilder, InfoBuilder, OpenApi, OpenApiBuilder, Ref, RefOr, Required, ResponseBuilder,
};

#[derive(Debug, Serialize)]
pub struct FieldModel {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub primary_key: bool,
    pub required: bool,
    pub nullable: bool,
}

#[derive(Debug, Serialize)]
pub struct IncludeModel {
    pub name: String,
    pub to_many: bool,
    pub related: String,
}

#[derive(Debug, Serialize)]
pub struct TransitionModel {
    pub event: String,
    pub to: String,
}

/// One row of the transition table: what can happen from `name`.
#[derive(Debug, Serialize)]
pub struct StateModel {
    pub name: String,
    pub terminal: bool,
    pub transitions: Vec<TransitionModel>,
}

#[derive(Debug, Serialize)]
pub struct MachineModel {
    pub name: String,
    pub initial_state: String,
    pub states: Vec<String>,
    pub events: Vec<String>,
    pub table: Vec<StateModel>,
}

fn machine_model(d: &StateMachineDescription) -> MachineModel {
    let table = d
        .states()
        .iter()
        .filter_map(|name| d.state(name))
        .map(|state| StateModel {
            name: d.state_name(state).to_string(),
            terminal: d.is_terminal(state),
            transitions: d
                .available_events(state)
                .into_iter()
                .filter_map(|event| {
                    let to = d.next(state, d.event(event)?)?;
                    Some(TransitionModel {
                        event: event.to_string(),
                        to: d.state_name(to).to_string(),
                    })
                })
                .collect(),
        })
        .collect();
    MachineModel {
        name: d.name.clone(),
        initial_state: d.initial_state().to_string(),
        states: d.states().to_vec(),
        events: d.events().to_vec(),
        table,
    }
}

#[derive(Debug, Serialize)]
pub struct ActionModel {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub fields: Vec<FieldModel>,
}

/// Everything a client code generator needs about one entity type.
#[derive(Debug, Serialize)]
pub struct TypeModel {
    pub name: String,
    pub primary_key: String,
    pub fields: Vec<FieldModel>,
    pub includes: Vec<IncludeModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_machine: Option<MachineModel>,
    pub actions: Vec<ActionModel>,
}

pub fn type_model(resource: &Resource, machines: &StateMachineManager, actions: &ActionEngine) -> TypeModel {
    let fields = resource
        .columns
        .iter()
        .map(|c| FieldModel {
            name: c.name.clone(),
            type_: c.column_type.name(),
            primary_key: c.primary_key,
            required: c.required(),
            nullable: c.nullable,
        })
        .collect();
    let includes = resource
        .includes
        .iter()
        .map(|i| IncludeModel {
            name: i.name.clone(),
            to_many: i.direction == IncludeDirection::ToMany,
            related: i.related.clone(),
        })
        .collect();
    let state_machine = machines.for_entity_type(&resource.name).map(machine_model);
    let actions = actions
        .definitions()
        .filter(|a| a.entity_type == resource.name)
        .map(|a| ActionModel {
            name: a.name.clone(),
            label: a.label.clone(),
            fields: a
                .input_fields
                .iter()
                .map(|f| FieldModel {
                    name: f.name.clone(),
                    type_: f.type_.name(),
                    primary_key: false,
                    required: f.required,
                    nullable: !f.required,
                })
                .collect(),
        })
        .collect();
    TypeModel {
        name: resource.name.clone(),
        primary_key: resource.pk_column.clone(),
        fields,
        includes,
        state_machine,
        actions,
    }
}

fn column_schema(column_type: ColumnType) -> RefOr<Schema> {
    let typed = |t: Type| ObjectBuilder::new().schema_type(SchemaType::Type(t));
    let known = |f: KnownFormat| Some(SchemaFormat::KnownFormat(f));
    match column_type {
        ColumnType::Label | ColumnType::Text => typed(Type::String).into(),
        ColumnType::Email => typed(Type::String).description(Some("email address")).into(),
        ColumnType::Integer => typed(Type::Integer).format(known(KnownFormat::Int32)).into(),
        ColumnType::Bigint => typed(Type::Integer).format(known(KnownFormat::Int64)).into(),
        ColumnType::Measurement => typed(Type::String).description(Some("decimal as text")).into(),
        ColumnType::Truefalse => typed(Type::Boolean).into(),
        ColumnType::Datetime => typed(Type::String).format(known(KnownFormat::DateTime)).into(),
        ColumnType::Date => typed(Type::String).format(known(KnownFormat::Date)).into(),
        ColumnType::Json => ObjectBuilder::new().description(Some("any JSON value")).into(),
        ColumnType::Uuid => typed(Type::String).format(known(KnownFormat::Uuid)).into(),
    }
}

fn resource_schema(resource: &Resource) -> RefOr<Schema> {
    let mut object = ObjectBuilder::new().schema_type(SchemaType::Type(Type::Object));
    for c in &resource.columns {
        object = object.property(&c.name, column_schema(c.column_type));
        if c.required() {
            object = object.required(&c.name);
        }
    }
    object.into()
}

fn json_content(schema: RefOr<Schema>) -> utoipa::openapi::Content {
    ContentBuilder::new().schema(Some(schema)).build()
}

fn one_envelope(name: &str) -> RefOr<Schema> {
    ObjectBuilder::new()
        .schema_type(SchemaType::Type(Type::Object))
        .property("data", Ref::from_schema_name(name))
        .required("data")
        .into()
}

fn many_envelope(name: &str) -> RefOr<Schema> {
    let count = ObjectBuilder::new()
        .schema_type(SchemaType::Type(Type::Object))
        .property("count", ObjectBuilder::new().schema_type(SchemaType::Type(Type::Integer)));
    ObjectBuilder::new()
        .schema_type(SchemaType::Type(Type::Object))
        .property(
            "data",
            RefOr::T(Schema::Array(Array::new(Ref::from_schema_name(name)))),
        )
        .property("meta", count)
        .required("data")
        .into()
}

/// OpenAPI 3 document for the generic CRUD surface of every resource.
pub fn api_blueprint(registry: &ResourceRegistry) -> OpenApi {
    let mut paths = PathsBuilder::new();
    let mut components = ComponentsBuilder::new();

    for resource in registry.iter() {
        let name = resource.name.as_str();
        components = components.schema(name, resource_schema(resource));

        let id_param = || {
            ParameterBuilder::new()
                .name("id")
                .parameter_in(ParameterIn::Path)
                .required(Required::True)
                .schema(Some(column_schema(
                    resource.column(&resource.pk_column).map(|c| c.column_type).unwrap_or(ColumnType::Bigint),
                )))
                .build()
        };
        let body = || {
            RequestBodyBuilder::new()
                .content("application/json", json_content(Ref::from_schema_name(name).into()))
                .required(Some(Required::True))
                .build()
        };
        let ok_one = |desc: &str| {
            ResponseBuilder::new()
                .description(desc)
                .content("application/json", json_content(one_envelope(name)))
                .build()
        };

        let list = OperationBuilder::new()
            .operation_id(Some(format!("list_{name}")))
            .summary(Some(format!("List {name}")))
            .tag(name)
            .response(
                "200",
                ResponseBuilder::new()
                    .description("rows")
                    .content("application/json", json_content(many_envelope(name)))
                    .build(),
            )
            .build();
        let create = OperationBuilder::new()
            .operation_id(Some(format!("create_{name}")))
            .summary(Some(format!("Create {name}")))
            .tag(name)
            .request_body(Some(body()))
            .response("201", ok_one("created"))
            .build();
        paths = paths.path(
            format!("/api/{name}"),
            PathItemBuilder::new()
                .operation(HttpMethod::Get, list)
                .operation(HttpMethod::Post, create)
                .build(),
        );

        let read = OperationBuilder::new()
            .operation_id(Some(format!("read_{name}")))
            .tag(name)
            .parameter(id_param())
            .response("200", ok_one("row"))
            .response("404", ResponseBuilder::new().description("not found").build())
            .build();
        let update = OperationBuilder::new()
            .operation_id(Some(format!("update_{name}")))
            .tag(name)
            .parameter(id_param())
            .request_body(Some(body()))
            .response("200", ok_one("updated"))
            .build();
        let delete = OperationBuilder::new()
            .operation_id(Some(format!("delete_{name}")))
            .tag(name)
            .parameter(id_param())
            .response("204", ResponseBuilder::new().description("deleted").build())
            .build();
        paths = paths.path(
            format!("/api/{name}/{{id}}"),
            PathItemBuilder::new()
                .operation(HttpMethod::Get, read)
                .operation(HttpMethod::Patch, update)
                .operation(HttpMethod::Delete, delete)
                .build(),
        );
    }

    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(env!("CARGO_PKG_NAME"))
                .version(env!("CARGO_PKG_VERSION"))
                .build(),
        )
        .paths(paths.build())
        .components(Some(components.build()))
        .build()
}
