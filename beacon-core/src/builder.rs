use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, ContentMapping, PageTemplate};
use crate::digest::{HashingWriter, Tee};
use crate::manifest::{Endpoint, Manifest};
use crate::site::{Target, TargetError};
use crate::template::{TemplateError, TemplateRenderer};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("duplicate url {0}")]
    DuplicateUrl(String),
    #[error("site {site}: {unit}: output file {} is already written by another unit", path.display())]
    DuplicateFile {
        site: String,
        unit: String,
        path: PathBuf,
    },
    #[error("site {site}: {unit}: output file {} clashes with a directory of another output file", path.display())]
    PathConflict {
        site: String,
        unit: String,
        path: PathBuf,
    },
    #[error("site {site}: {unit}: {source}")]
    Target {
        site: String,
        unit: String,
        #[source]
        source: TargetError,
    },
    #[error("site {site}: {unit}: missing content {}: {source}", path.display())]
    MissingContent {
        site: String,
        unit: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("site {site}: {unit}: cannot write {}: {source}", path.display())]
    Write {
        site: String,
        unit: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("site {site}: {unit}: {source}")]
    Template {
        site: String,
        unit: String,
        #[source]
        source: TemplateError,
    },
    #[error(transparent)]
    Templates(TemplateError),
}

/// Publishes a site definition to disk and records what every published
/// URL must serve.
///
/// Building happens in two passes. The first resolves every URL, output
/// path, content source and template without touching the output tree, so
/// a configuration error never leaves partial output. The second copies
/// and renders, hashing each file as it is written.
pub struct ManifestBuilder {
    content_dir: PathBuf,
    templates_dir: PathBuf,
    sites_dir: PathBuf,
    scheme: String,
    echo: bool,
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self {
            content_dir: PathBuf::from("./content"),
            templates_dir: PathBuf::from("./templates"),
            sites_dir: PathBuf::from("./www"),
            scheme: "https".to_string(),
            echo: false,
        }
    }

    pub fn content_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.content_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn templates_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.templates_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn sites_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sites_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn scheme<S: Into<String>>(mut self, scheme: S) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Mirror rendered pages to stdout while writing them.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn build(&self, config: &Config) -> Result<Manifest, BuildError> {
        let steps = self.plan(config)?;
        let renderer = self.load_templates(&steps)?;

        let mut manifest = Manifest::new();
        for step in &steps {
            match &step.unit {
                Unit::Content { mapping, source } => {
                    self.copy_content(step, mapping, source, &mut manifest)?;
                }
                Unit::Page(page) => {
                    self.render_page(step, page, renderer.as_ref(), &mut manifest)?;
                }
            }
        }

        info!(
            sites = config.sites.len(),
            endpoints = manifest.len(),
            output = %self.sites_dir.display(),
            "published sites"
        );
        Ok(manifest)
    }

    /// Resolves every unit in traversal order: site name, domain, content
    /// mappings before pages, then path order.
    fn plan<'a>(&self, config: &'a Config) -> Result<Vec<Step<'a>>, BuildError> {
        let mut claims = Claims::default();
        let mut steps = Vec::new();

        for (site, definition) in &config.sites {
            for domain in &definition.domains {
                for mapping in &definition.content {
                    let source = mapping.address.resolve(&self.content_dir);
                    let mut step = Step {
                        site,
                        unit: Unit::Content {
                            mapping,
                            source: source.clone(),
                        },
                        targets: Vec::new(),
                    };
                    step.targets = self.targets(&step, steps.len(), domain, &mapping.paths, &mut claims)?;
                    check_source(&source).map_err(|source_err| BuildError::MissingContent {
                        site: site.clone(),
                        unit: step.unit.to_string(),
                        path: source.clone(),
                        source: source_err,
                    })?;
                    steps.push(step);
                }
                for page in &definition.pages {
                    let mut step = Step {
                        site,
                        unit: Unit::Page(page),
                        targets: Vec::new(),
                    };
                    step.targets = self.targets(&step, steps.len(), domain, &page.paths, &mut claims)?;
                    if !(page.data.is_null() || page.data.is_object()) {
                        return Err(step.template_error(TemplateError::Data {
                            template: format!("{}.html", page.template),
                        }));
                    }
                    steps.push(step);
                }
            }
        }

        debug!(units = steps.len(), urls = claims.urls.len(), "planned build");
        Ok(steps)
    }

    /// Resolves `paths` for one step. URLs must be unique across the whole
    /// build; an output file may only be shared by paths of the same step,
    /// since those are written with identical bytes. No output file may sit
    /// where another one needs a directory (`/docs` next to `/docs/`).
    fn targets(
        &self,
        step: &Step<'_>,
        index: usize,
        domain: &str,
        paths: &[String],
        claims: &mut Claims,
    ) -> Result<Vec<Target>, BuildError> {
        paths
            .iter()
            .map(|path| {
                let target = Target::new(&self.scheme, domain, path, &self.sites_dir).map_err(|source| {
                    BuildError::Target {
                        site: step.site.clone(),
                        unit: step.unit.to_string(),
                        source,
                    }
                })?;
                if !claims.urls.insert(target.url.clone()) {
                    return Err(BuildError::DuplicateUrl(target.url));
                }
                if claims.dirs.contains(&target.file)
                    || target.file.ancestors().skip(1).any(|dir| claims.files.contains_key(dir))
                {
                    return Err(BuildError::PathConflict {
                        site: step.site.clone(),
                        unit: step.unit.to_string(),
                        path: target.file,
                    });
                }
                let owner = *claims.files.entry(target.file.clone()).or_insert(index);
                if owner != index {
                    return Err(BuildError::DuplicateFile {
                        site: step.site.clone(),
                        unit: step.unit.to_string(),
                        path: target.file,
                    });
                }
                claims
                    .dirs
                    .extend(target.file.ancestors().skip(1).map(Path::to_path_buf));
                Ok(target)
            })
            .collect()
    }

    /// Parses the template tree once, and only when some site has pages.
    /// Every referenced template must exist before anything is written.
    fn load_templates(&self, steps: &[Step<'_>]) -> Result<Option<TemplateRenderer>, BuildError> {
        if !steps.iter().any(|s| matches!(s.unit, Unit::Page(_))) {
            return Ok(None);
        }

        let renderer = TemplateRenderer::new(&self.templates_dir).map_err(BuildError::Templates)?;
        for step in steps {
            if let Unit::Page(page) = &step.unit {
                renderer
                    .template(&page.template)
                    .map_err(|source| step.template_error(source))?;
            }
        }
        Ok(Some(renderer))
    }

    fn copy_content(
        &self,
        step: &Step<'_>,
        mapping: &ContentMapping,
        source: &Path,
        manifest: &mut Manifest,
    ) -> Result<(), BuildError> {
        for target in &step.targets {
            let mut src = File::open(source).map_err(|e| BuildError::MissingContent {
                site: step.site.clone(),
                unit: step.unit.to_string(),
                path: source.to_path_buf(),
                source: e,
            })?;
            let mut writer = self.create(step, &target.file)?;
            io::copy(&mut src, &mut writer).map_err(|e| step.write_error(&target.file, e))?;
            let (_, digest, bytes) = writer.finish().map_err(|e| step.write_error(&target.file, e))?;

            debug!(
                address = %mapping.address,
                src = %source.display(),
                dst = %target.file.display(),
                bytes,
                "copied content"
            );
            manifest.push(Endpoint::get(target.url.clone(), digest));
        }
        Ok(())
    }

    fn render_page(
        &self,
        step: &Step<'_>,
        page: &PageTemplate,
        renderer: Option<&TemplateRenderer>,
        manifest: &mut Manifest,
    ) -> Result<(), BuildError> {
        let template = renderer
            .ok_or_else(|| TemplateError::NotFound(page.template.clone()))
            .and_then(|r| r.template(&page.template))
            .map_err(|e| step.template_error(e))?;

        for target in &step.targets {
            let mut writer = self.create(step, &target.file)?;
            let rendered = if self.echo {
                template.render_to(&page.data, Tee::new(&mut writer, io::stdout().lock()))
            } else {
                template.render_to(&page.data, &mut writer)
            };
            rendered.map_err(|e| step.template_error(e))?;
            let (_, digest, bytes) = writer.finish().map_err(|e| step.write_error(&target.file, e))?;

            debug!(
                template = template.name(),
                dst = %target.file.display(),
                bytes,
                "rendered page"
            );
            manifest.push(Endpoint::get(target.url.clone(), digest));
        }
        Ok(())
    }

    fn create(&self, step: &Step<'_>, file: &Path) -> Result<HashingWriter<BufWriter<File>>, BuildError> {
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| step.write_error(file, e))?;
        }
        let dst = File::create(file).map_err(|e| step.write_error(file, e))?;
        Ok(HashingWriter::new(BufWriter::new(dst)))
    }
}

fn check_source(path: &Path) -> io::Result<()> {
    if std::fs::metadata(path)?.is_file() {
        Ok(())
    } else {
        Err(io::Error::other("not a regular file"))
    }
}

#[derive(Default)]
struct Claims {
    urls: HashSet<String>,
    /// Output file and the index of the step that writes it
    files: HashMap<PathBuf, usize>,
    /// Every directory above a claimed file
    dirs: HashSet<PathBuf>,
}

/// One publishable unit for one domain, with its resolved targets.
struct Step<'a> {
    site: &'a String,
    unit: Unit<'a>,
    targets: Vec<Target>,
}

enum Unit<'a> {
    Content {
        mapping: &'a ContentMapping,
        source: PathBuf,
    },
    Page(&'a PageTemplate),
}

impl std::fmt::Display for Unit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unit::Content { mapping, .. } => mapping.fmt(f),
            Unit::Page(page) => page.fmt(f),
        }
    }
}

impl Step<'_> {
    fn write_error(&self, path: &Path, source: io::Error) -> BuildError {
        BuildError::Write {
            site: self.site.clone(),
            unit: self.unit.to_string(),
            path: path.to_path_buf(),
            source,
        }
    }

    fn template_error(&self, source: TemplateError) -> BuildError {
        BuildError::Template {
            site: self.site.clone(),
            unit: self.unit.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::ContentDigest;
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                root: tempfile::tempdir().unwrap(),
            };
            fixture.write("content/static/logo.svg", "<svg/>");
            fixture.write("content/static/css/site.css", "body { margin: 0 }");
            fixture.write("templates/home.html", "<h1>{{ title }}</h1>");
            fixture.write("templates/about.html", r#"{{ markdown_to_html(name="about") | safe }}"#);
            fixture.write("templates/about.md", "# About\n");
            fixture
        }

        fn write(&self, relative: &str, content: &str) {
            let path = self.root.path().join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        fn sites(&self) -> PathBuf {
            self.root.path().join("sites")
        }

        fn builder(&self) -> ManifestBuilder {
            ManifestBuilder::new()
                .content_dir(self.root.path().join("content"))
                .templates_dir(self.root.path().join("templates"))
                .sites_dir(self.sites())
        }
    }

    fn config(json: &str) -> Config {
        Config::parse(json).unwrap()
    }

    const SITE: &str = r#"{"sites": {
        "main": {
            "domains": ["www.example.com", "example.com"],
            "content": [
                {"paths": ["/logo.svg", "/img/logo.svg"], "address": "static:logo.svg"},
                {"paths": ["/site.css"], "address": "static:css/site.css"}
            ],
            "pages": [
                {"paths": ["/", "/index.html"], "template": "home", "data": {"title": "Welcome"}},
                {"paths": ["/about/"], "template": "about"}
            ]
        }
    }}"#;

    #[test]
    fn test_build_writes_files_and_manifest() {
        let fixture = Fixture::new();
        let manifest = fixture.builder().build(&config(SITE)).unwrap();

        let urls: Vec<&str> = manifest.endpoints().iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.example.com/logo.svg",
                "https://www.example.com/img/logo.svg",
                "https://www.example.com/site.css",
                "https://www.example.com/",
                "https://www.example.com/index.html",
                "https://www.example.com/about/",
                "https://example.com/logo.svg",
                "https://example.com/img/logo.svg",
                "https://example.com/site.css",
                "https://example.com/",
                "https://example.com/index.html",
                "https://example.com/about/",
            ]
        );
        assert!(manifest.endpoints().iter().all(|e| e.method == "GET" && e.expected_status_code == 200));

        let www = fixture.sites().join("com.example.www");
        assert_eq!(std::fs::read_to_string(www.join("img/logo.svg")).unwrap(), "<svg/>");
        assert_eq!(std::fs::read_to_string(www.join("index.html")).unwrap(), "<h1>Welcome</h1>");
        assert_eq!(
            std::fs::read_to_string(www.join("about/index.html")).unwrap(),
            "<h1>About</h1>\n"
        );
    }

    #[test]
    fn test_recorded_hash_matches_file_on_disk() {
        let fixture = Fixture::new();
        let manifest = fixture.builder().build(&config(SITE)).unwrap();

        let expected = [
            ("https://example.com/site.css", "com.example/site.css"),
            ("https://example.com/", "com.example/index.html"),
            ("https://www.example.com/about/", "com.example.www/about/index.html"),
        ];
        for (url, file) in expected {
            let endpoint = manifest.endpoints().iter().find(|e| e.url == url).unwrap();
            let bytes = std::fs::read(fixture.sites().join(file)).unwrap();
            assert_eq!(endpoint.expected_body_hash, ContentDigest::of(&bytes), "{url}");
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let fixture = Fixture::new();
        let config = config(SITE);

        let first = fixture.builder().build(&config).unwrap();
        let index = std::fs::read(fixture.sites().join("com.example/index.html")).unwrap();
        let second = fixture.builder().build(&config).unwrap();

        assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
        assert_eq!(
            index,
            std::fs::read(fixture.sites().join("com.example/index.html")).unwrap()
        );
    }

    #[test]
    fn test_sites_are_walked_in_name_order() {
        let fixture = Fixture::new();
        let manifest = fixture
            .builder()
            .build(&config(
                r#"{"sites": {
                    "zeta": {"domains": ["z.test"], "content": [{"paths": ["/a"], "address": "static:logo.svg"}]},
                    "alpha": {"domains": ["a.test"], "content": [{"paths": ["/a"], "address": "static:logo.svg"}]}
                }}"#,
            ))
            .unwrap();
        assert_eq!(manifest.endpoints()[0].url, "https://a.test/a");
        assert_eq!(manifest.endpoints()[1].url, "https://z.test/a");
    }

    #[test]
    fn test_duplicate_url_fails_before_any_write() {
        let fixture = Fixture::new();
        let err = fixture
            .builder()
            .build(&config(
                r#"{"sites": {
                    "a": {"domains": ["example.com"],
                          "content": [{"paths": ["/one", "/index.html"], "address": "static:logo.svg"}]},
                    "b": {"domains": ["example.com"],
                          "pages": [{"paths": ["/index.html"], "template": "home"}]}
                }}"#,
            ))
            .unwrap_err();

        assert!(matches!(&err, BuildError::DuplicateUrl(url) if url == "https://example.com/index.html"));
        assert!(!fixture.sites().exists());
    }

    #[test]
    fn test_duplicate_within_one_unit() {
        let fixture = Fixture::new();
        let err = fixture
            .builder()
            .build(&config(
                r#"{"sites": {"a": {"domains": ["example.com"],
                    "pages": [{"paths": ["/x", "/x"], "template": "home"}]}}}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateUrl(_)));
    }

    #[test]
    fn test_units_cannot_share_an_output_file() {
        let fixture = Fixture::new();
        let err = fixture
            .builder()
            .build(&config(
                r#"{"sites": {"a": {"domains": ["example.com"],
                    "content": [{"paths": ["/"], "address": "static:logo.svg"}],
                    "pages": [{"paths": ["/index.html"], "template": "home"}]}}}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateFile { .. }));
        assert!(!fixture.sites().exists());
    }

    #[test]
    fn test_file_cannot_take_the_place_of_a_directory() {
        let definitions = [
            // one unit, as a file and as a directory index
            r#"{"sites": {"a": {"domains": ["example.com"],
                "pages": [{"paths": ["/docs", "/docs/"], "template": "home"}]}}}"#,
            // a file, then another unit below it
            r#"{"sites": {"a": {"domains": ["example.com"],
                "content": [
                    {"paths": ["/a"], "address": "static:logo.svg"},
                    {"paths": ["/a/b"], "address": "static:logo.svg"}
                ]}}}"#,
            // a nested file first, then its parent directory as a file
            r#"{"sites": {"a": {"domains": ["example.com"],
                "content": [{"paths": ["/img/logo.svg"], "address": "static:logo.svg"}],
                "pages": [{"paths": ["/img"], "template": "home"}]}}}"#,
        ];

        for definition in definitions {
            let fixture = Fixture::new();
            let err = fixture.builder().build(&config(definition)).unwrap_err();
            assert!(matches!(err, BuildError::PathConflict { .. }), "{definition}: {err}");
            assert!(!fixture.sites().exists(), "{definition}");
        }
    }

    #[test]
    fn test_sibling_paths_do_not_clash() {
        let fixture = Fixture::new();
        let manifest = fixture
            .builder()
            .build(&config(
                r#"{"sites": {"a": {"domains": ["example.com"],
                    "content": [{"paths": ["/docs/a.svg", "/docs/b.svg", "/docs.svg"], "address": "static:logo.svg"}],
                    "pages": [{"paths": ["/docs/"], "template": "home"}]}}}"#,
            ))
            .unwrap();
        assert_eq!(manifest.len(), 4);
    }

    #[test]
    fn test_non_object_page_data_fails_before_any_write() {
        let fixture = Fixture::new();
        let err = fixture
            .builder()
            .build(&config(
                r#"{"sites": {"a": {"domains": ["example.com"],
                    "content": [{"paths": ["/logo.svg"], "address": "static:logo.svg"}],
                    "pages": [{"paths": ["/"], "template": "home", "data": [1]}]}}}"#,
            ))
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::Template { source: TemplateError::Data { .. }, .. }
        ));
        assert!(!fixture.sites().exists());
    }

    #[test]
    fn test_echo_leaves_output_unchanged() {
        let quiet = Fixture::new();
        let echoed = Fixture::new();

        let plain = quiet.builder().build(&config(SITE)).unwrap();
        let mirrored = echoed.builder().echo(true).build(&config(SITE)).unwrap();

        assert_eq!(plain, mirrored);
        let pages = [
            ("https://example.com/", "com.example/index.html"),
            ("https://www.example.com/about/", "com.example.www/about/index.html"),
        ];
        for (url, file) in pages {
            let bytes = std::fs::read(echoed.sites().join(file)).unwrap();
            assert_eq!(bytes, std::fs::read(quiet.sites().join(file)).unwrap(), "{file}");
            let endpoint = mirrored.endpoints().iter().find(|e| e.url == url).unwrap();
            assert_eq!(endpoint.expected_body_hash, ContentDigest::of(&bytes), "{url}");
        }
    }

    #[test]
    fn test_missing_content_fails_before_any_write() {
        let fixture = Fixture::new();
        let err = fixture
            .builder()
            .build(&config(
                r#"{"sites": {"a": {"domains": ["example.com"],
                    "content": [
                        {"paths": ["/logo.svg"], "address": "static:logo.svg"},
                        {"paths": ["/gone"], "address": "static:missing.txt"}
                    ]}}}"#,
            ))
            .unwrap_err();

        assert!(matches!(err, BuildError::MissingContent { .. }));
        assert!(err.to_string().contains("static:missing.txt"));
        assert!(!fixture.sites().exists());
    }

    #[test]
    fn test_unknown_template_fails_before_any_write() {
        let fixture = Fixture::new();
        let err = fixture
            .builder()
            .build(&config(
                r#"{"sites": {"a": {"domains": ["example.com"],
                    "content": [{"paths": ["/logo.svg"], "address": "static:logo.svg"}],
                    "pages": [{"paths": ["/"], "template": "nope"}]}}}"#,
            ))
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::Template { source: TemplateError::NotFound(_), .. }
        ));
        assert!(!fixture.sites().exists());
    }

    #[test]
    fn test_render_error_names_the_page() {
        let fixture = Fixture::new();
        fixture.write("templates/broken.html", r#"{{ markdown_to_html(name="missing") | safe }}"#);
        let err = fixture
            .builder()
            .build(&config(
                r#"{"sites": {"a": {"domains": ["example.com"],
                    "pages": [{"paths": ["/"], "template": "broken"}]}}}"#,
            ))
            .unwrap_err();

        assert!(matches!(err, BuildError::Template { .. }));
        assert!(err.to_string().contains("page broken"));
    }

    #[test]
    fn test_invalid_path_is_rejected() {
        let fixture = Fixture::new();
        let err = fixture
            .builder()
            .build(&config(
                r#"{"sites": {"a": {"domains": ["example.com"],
                    "content": [{"paths": ["/../../etc/passwd"], "address": "static:logo.svg"}]}}}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, BuildError::Target { .. }));
        assert!(!fixture.sites().exists());
    }

    #[test]
    fn test_scheme_is_configurable() {
        let fixture = Fixture::new();
        let manifest = fixture
            .builder()
            .scheme("http")
            .build(&config(
                r#"{"sites": {"a": {"domains": ["localhost"],
                    "content": [{"paths": ["/logo.svg"], "address": "static:logo.svg"}]}}}"#,
            ))
            .unwrap();
        assert_eq!(manifest.endpoints()[0].url, "http://localhost/logo.svg");
    }

    #[test]
    fn test_empty_definition() {
        let fixture = Fixture::new();
        let manifest = fixture.builder().build(&Config::default()).unwrap();
        assert!(manifest.is_empty());
    }
}
