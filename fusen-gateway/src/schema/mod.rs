use http::Method;
use prost_reflect::{DescriptorPool, DynamicMessage, FileDescriptor};
use protox::{
    file::{ChainFileResolver, File, FileResolver, GoogleFileResolver, IncludeFileResolver},
    Compiler,
};
use std::{
    collections::HashMap,
    fs,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, warn};

use crate::error::GatewayError;

pub const SCHEMA_EXTENSION: &str = "proto";
pub const HTTP_OPTION: &str = "google.api.http";
const ADDITIONAL_BINDINGS: &str = "additional_bindings";
const SUPPORTED_VERBS: [(&str, Method); 4] = [
    ("get", Method::GET),
    ("put", Method::PUT),
    ("post", Method::POST),
    ("delete", Method::DELETE),
];

const ANNOTATIONS_PROTO: &str = "google/api/annotations.proto";
const HTTP_PROTO: &str = "google/api/http.proto";

/// Serves the `google.api.http` annotation when the schema tree does not
/// carry its own copy of it.
struct GoogleApiResolver;

impl FileResolver for GoogleApiResolver {
    fn open_file(&self, name: &str) -> Result<File, protox::Error> {
        match name {
            ANNOTATIONS_PROTO => File::from_source(
                name,
                include_str!("../../protos/google/api/annotations.proto"),
            ),
            HTTP_PROTO => File::from_source(name, include_str!("../../protos/google/api/http.proto")),
            _ => Err(protox::Error::file_not_found(name)),
        }
    }
}

/// An rpc method reachable over http, one per declared verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBinding {
    pub verb: Method,
    pub path_template: String,
    pub package: String,
    pub service: String,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub package: String,
    pub service: String,
    pub method: String,
    /// Full name of the request message.
    pub input_type: String,
    /// Full name of the response message.
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

impl MethodDescriptor {
    pub fn is_unary(&self) -> bool {
        !self.client_streaming && !self.server_streaming
    }

    pub fn full_service_name(&self) -> String {
        if self.package.is_empty() {
            self.service.clone()
        } else {
            format!("{}.{}", self.package, self.service)
        }
    }

    /// `/{package}.{Service}/{Method}`
    pub fn rpc_path(&self) -> String {
        format!("/{}/{}", self.full_service_name(), self.method)
    }
}

impl From<&prost_reflect::MethodDescriptor> for MethodDescriptor {
    fn from(method: &prost_reflect::MethodDescriptor) -> Self {
        let service = method.parent_service();
        Self {
            package: service.package_name().to_owned(),
            service: service.name().to_owned(),
            method: method.name().to_owned(),
            input_type: method.input().full_name().to_owned(),
            output_type: method.output().full_name().to_owned(),
            client_streaming: method.is_client_streaming(),
            server_streaming: method.is_server_streaming(),
        }
    }
}

type MethodKey = (String, String, String);

/// Invocation descriptors keyed by `(package, service, method)`.
#[derive(Debug, Default, Clone)]
pub struct MethodTable {
    methods: HashMap<MethodKey, Arc<MethodDescriptor>>,
}

impl MethodTable {
    pub fn get(&self, package: &str, service: &str, method: &str) -> Option<Arc<MethodDescriptor>> {
        self.methods
            .get(&(package.to_owned(), service.to_owned(), method.to_owned()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Recursively lists every file under `dir`. A missing directory yields an
/// empty list. Entries are visited in name order.
pub fn list_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, GatewayError> {
    let dir = dir.as_ref();
    let mut files = vec![];
    if !dir.exists() {
        return Ok(files);
    }
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<PathBuf>, _>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            files.append(&mut list_files(&path)?);
        } else {
            files.push(path);
        }
    }
    Ok(files)
}

pub fn schema_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, GatewayError> {
    Ok(list_files(dir)?
        .into_iter()
        .filter(|e| e.extension().is_some_and(|ext| ext == SCHEMA_EXTENSION))
        .collect())
}

/// `library/v1/library.proto` for `{dir}/library/v1/library.proto`.
fn schema_name(dir: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(dir).ok()?;
    let mut parts = vec![];
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Compiles `files` with `dir` as the import root. Imports of the well known
/// `google/protobuf` types and of `google/api/annotations.proto` resolve
/// without being present under `dir`. `None` for an empty file list.
pub fn parse_schemas(
    dir: impl AsRef<Path>,
    files: &[PathBuf],
) -> Result<Option<Vec<FileDescriptor>>, GatewayError> {
    if files.is_empty() {
        return Ok(None);
    }
    let dir = dir.as_ref();
    let mut resolver = ChainFileResolver::new();
    resolver.add(IncludeFileResolver::new(dir.to_path_buf()));
    resolver.add(GoogleApiResolver);
    resolver.add(GoogleFileResolver::new());
    let mut compiler = Compiler::with_file_resolver(resolver);
    for file in files {
        compiler
            .open_file(file)
            .map_err(|source| GatewayError::Schema {
                file: file.display().to_string(),
                source,
            })?;
    }
    let pool = compiler.descriptor_pool();
    let mut schemas = Vec::with_capacity(files.len());
    for file in files {
        let Some(schema) = schema_name(dir, file).and_then(|name| pool.get_file_by_name(&name))
        else {
            warn!("schema {} is outside of {}", file.display(), dir.display());
            continue;
        };
        debug!(
            "parse schema {} : package {:?}, {} service",
            file.display(),
            schema.package_name(),
            schema.services().count()
        );
        schemas.push(schema);
    }
    Ok(Some(schemas))
}

/// Builds the method table of the compiled schemas. `None` for an empty list.
pub fn load_method_table(schemas: &[FileDescriptor]) -> Option<MethodTable> {
    if schemas.is_empty() {
        return None;
    }
    let mut methods = HashMap::new();
    for service in schemas.iter().flat_map(|schema| schema.services()) {
        for method in service.methods() {
            let descriptor = MethodDescriptor::from(&method);
            methods.insert(
                (
                    descriptor.package.clone(),
                    descriptor.service.clone(),
                    descriptor.method.clone(),
                ),
                Arc::new(descriptor),
            );
        }
    }
    Some(MethodTable { methods })
}

fn collect_http_rules(rule: &DynamicMessage, rules: &mut Vec<(Method, String)>) {
    for (key, verb) in &SUPPORTED_VERBS {
        if !rule.has_field_by_name(key) {
            continue;
        }
        if let Some(path) = rule.get_field_by_name(key) {
            if let Some(path) = path.as_str() {
                rules.push((verb.clone(), path.to_owned()));
            }
        }
    }
    let Some(bindings) = rule.get_field_by_name(ADDITIONAL_BINDINGS) else {
        return;
    };
    for binding in bindings.as_list().unwrap_or_default() {
        if let Some(binding) = binding.as_message() {
            collect_http_rules(binding, rules);
        }
    }
}

/// `(verb, path template)` pairs of the `google.api.http` option of a method,
/// `additional_bindings` included. `patch` and `custom` patterns are dropped.
pub fn http_rules(method: &prost_reflect::MethodDescriptor) -> Vec<(Method, String)> {
    let mut rules = vec![];
    let Some(extension) = method.parent_pool().get_extension_by_name(HTTP_OPTION) else {
        return rules;
    };
    let options = method.options();
    if !options.has_extension(&extension) {
        return rules;
    }
    if let Some(rule) = options.get_extension(&extension).as_message() {
        collect_http_rules(rule, &mut rules);
    }
    rules
}

/// Every http binding of the schemas, in schema, service, method and option order.
pub fn method_bindings(schemas: &[FileDescriptor]) -> Vec<MethodBinding> {
    let mut bindings = vec![];
    for service in schemas.iter().flat_map(|schema| schema.services()) {
        for method in service.methods() {
            for (verb, path_template) in http_rules(&method) {
                bindings.push(MethodBinding {
                    verb,
                    path_template,
                    package: service.package_name().to_owned(),
                    service: service.name().to_owned(),
                    method: method.name().to_owned(),
                });
            }
        }
    }
    bindings
}

/// Schemas compiled from a directory tree together with their method table.
/// `pool` also holds every import, the message descriptors used on the wire
/// are looked up there.
#[derive(Debug, Default, Clone)]
pub struct SchemaCatalog {
    pub pool: DescriptorPool,
    pub schemas: Vec<FileDescriptor>,
    pub methods: MethodTable,
}

impl SchemaCatalog {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let dir = dir.as_ref();
        let files = schema_files(dir)?;
        let Some(schemas) = parse_schemas(dir, &files)? else {
            return Ok(Self::default());
        };
        let methods = load_method_table(&schemas).unwrap_or_default();
        let pool = schemas
            .first()
            .map(|e| e.parent_pool().clone())
            .unwrap_or_default();
        Ok(Self {
            pool,
            schemas,
            methods,
        })
    }

    pub fn bindings(&self) -> Vec<MethodBinding> {
        method_bindings(&self.schemas)
    }
}

#[cfg(test)]
mod test {
    use super::{
        http_rules, list_files, load_method_table, method_bindings, parse_schemas, schema_files,
        SchemaCatalog,
    };
    use crate::error::GatewayError;
    use http::Method;
    use std::path::PathBuf;

    fn data_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")
    }

    fn proto_dir() -> PathBuf {
        data_dir().join("protos")
    }

    #[test]
    fn list_files_nested() {
        let files = list_files(proto_dir()).unwrap();
        assert_eq!(files.len(), 4);
        let protos = schema_files(proto_dir()).unwrap();
        assert_eq!(protos.len(), 3);
        assert!(protos.iter().any(|e| e.ends_with("library/v1/library.proto")));
    }

    #[test]
    fn list_files_not_exists() {
        assert!(list_files("./notExists").unwrap().is_empty());
        assert!(schema_files("./notExists").unwrap().is_empty());
    }

    #[test]
    fn empty_input_is_noop() {
        assert!(parse_schemas(proto_dir(), &[]).unwrap().is_none());
        assert!(load_method_table(&[]).is_none());
        let catalog = SchemaCatalog::load("./notExists").unwrap();
        assert!(catalog.schemas.is_empty());
        assert!(catalog.bindings().is_empty());
    }

    #[test]
    fn parse_error_names_file() {
        let file = data_dir().join("broken.proto");
        let err = parse_schemas(data_dir(), &[file]).unwrap_err();
        assert!(matches!(err, GatewayError::Schema { file, .. } if file.ends_with("broken.proto")));
        let file = data_dir().join("notExists.proto");
        let err = parse_schemas(data_dir(), &[file]).unwrap_err();
        assert!(matches!(err, GatewayError::Schema { file, .. } if file.ends_with("notExists.proto")));
    }

    #[test]
    fn unsupported_verbs_are_dropped() {
        let dir = data_dir().join("bindings");
        let schemas = parse_schemas(&dir, &schema_files(&dir).unwrap())
            .unwrap()
            .unwrap();
        let service = schemas[0].services().next().unwrap();
        let methods: Vec<_> = service.methods().collect();
        assert_eq!(
            http_rules(&methods[0]),
            vec![
                (Method::PUT, "/v1/shelves/{id}".to_owned()),
                (Method::POST, "/v1/shelves/{id}:update".to_owned()),
                (Method::DELETE, "/v1/shelves/{id}".to_owned()),
            ]
        );
        assert!(http_rules(&methods[1]).is_empty());
        assert!(http_rules(&methods[2]).is_empty());
    }

    #[test]
    fn catalog_bindings() {
        let catalog = SchemaCatalog::load(proto_dir()).unwrap();
        assert_eq!(catalog.schemas.len(), 3);
        let bindings = catalog.bindings();
        let paths: Vec<(Method, &str, &str)> = bindings
            .iter()
            .map(|e| (e.verb.clone(), e.path_template.as_str(), e.method.as_str()))
            .collect();
        assert_eq!(
            paths,
            vec![
                (Method::GET, "/v1/test/{shelf}/books/{book}", "GetBook"),
                (Method::POST, "/v1/test/{shelf}/books", "CreateBook"),
                (Method::DELETE, "/v1/test/{shelf}/books/{book}", "DeleteBook"),
                (Method::GET, "/v1/echo/{message}", "Echo"),
                (Method::GET, "/v2/library/books", "ListBooks"),
            ]
        );
        assert_eq!(bindings[0].package, "bookstore");
        assert_eq!(bindings[0].service, "BookService");

        let descriptor = catalog.methods.get("bookstore", "BookService", "GetBook").unwrap();
        assert_eq!(descriptor.rpc_path(), "/bookstore.BookService/GetBook");
        assert_eq!(descriptor.input_type, "bookstore.GetBookRequest");
        assert_eq!(descriptor.output_type, "bookstore.Book");
        assert!(descriptor.is_unary());
        let watch = catalog.methods.get("bookstore", "BookService", "WatchBooks").unwrap();
        assert!(watch.server_streaming && !watch.is_unary());
        let echo = catalog.methods.get("", "EchoService", "Echo").unwrap();
        assert_eq!(echo.rpc_path(), "/EchoService/Echo");
        let list = catalog.methods.get("library.v1", "LibraryService", "ListBooks").unwrap();
        assert_eq!(list.input_type, "google.protobuf.Empty");
        assert!(catalog.methods.get("bookstore", "BookService", "Nothing").is_none());
        assert_eq!(method_bindings(&catalog.schemas), bindings);
        assert!(catalog.pool.get_message_by_name("bookstore.Book").is_some());
    }
}
