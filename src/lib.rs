//! Featurewalk – filtered feature queries over mapped stores, and a walker
//! that turns the resulting features into flat records.
//!
//! A query is built from three parts:
//! * A [`filter::Predicate`] – temporal ranges, bounding boxes and `LIKE`
//!   patterns combined with `AND`/`OR`, each validated when constructed.
//! * A [`query::QueryDescriptor`] – the target feature type (optionally
//!   namespace qualified), the predicate and an optional result limit.
//! * A store implementing [`source::FeatureSource`] – anything that can open
//!   a feature type, scan it and close it again.
//!
//! [`source::execute`] submits the descriptor and returns a
//! [`source::FeatureCollection`] whose features can be taken exactly once as a
//! lazy [`source::FeatureCursor`]. The cursor releases the store handle once,
//! whether it runs dry, hits the limit, fails, is closed or is dropped.
//!
//! Features are nested: a property can hold a primitive, a geometry or a
//! [`feature::ComplexAttribute`] with its own children. The
//! [`walker::ResultWalker`] resolves a fixed list of attribute names against
//! each feature, rendering complex attributes through their simple content and
//! reporting missing attributes as [`walker::Lookup::Absent`].
//!
//! ## Modules
//! * [`feature`] – attribute names, values and the nested feature model.
//! * [`filter`] – the predicate algebra and its CQL rendering.
//! * [`evaluate`] – compiles predicates into in-memory matchers.
//! * [`query`] – query descriptors.
//! * [`source`] – the store abstraction, the collection and its cursor.
//! * [`walker`] – attribute resolution and record output.
//! * [`memory`] – an in-memory store.
//! * [`persist`] – a SQLite store over flat tables with nested mappings.
//! * [`gsml`] – a GeoSciML `MappedFeature` mapping with demo data.
//! * [`settings`] – layered configuration.
//! * [`server`] – an HTTP endpoint for running queries.
//!
//! ## Quick Start
//! ```
//! use featurewalk::feature::{AttributeName, ComplexAttribute, Feature, Property};
//! use featurewalk::filter::text_like;
//! use featurewalk::memory::MemoryFeatureSource;
//! use featurewalk::query::build_query;
//! use featurewalk::source::execute;
//! use featurewalk::walker::ResultWalker;
//!
//! let name = AttributeName::local("name");
//! let feature = Feature::new("f.1").with_property(Property::new(
//!     name.clone(),
//!     ComplexAttribute::new(name.clone()).with_simple_content("UNITED KINGDOM"),
//! ));
//! let source = MemoryFeatureSource::new().with_type(AttributeName::local("Country"), vec![feature]);
//! let descriptor = build_query("Country", None, text_like(name.clone(), "UNITED%").unwrap(), None).unwrap();
//! let mut collection = execute(&source, &descriptor).unwrap();
//! let walker = ResultWalker::new([name]);
//! let records: Vec<_> = walker.walk(collection.features().unwrap()).collect::<Result<_, _>>().unwrap();
//! assert_eq!(records[0].to_string(), "f.1|name=UNITED KINGDOM");
//! assert_eq!(source.open_handles(), 0);
//! ```

pub mod error;
pub mod feature;
pub mod filter;
pub mod evaluate;
pub mod query;
pub mod source;
pub mod walker;
pub mod memory;
pub mod persist;
pub mod gsml;
pub mod settings;
pub mod server;

pub use error::{FeatureQueryError, Result};
