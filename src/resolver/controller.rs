//! Controller registration and route synthesis
//!
//! A controller type becomes a shared registry entry plus one route per
//! route-marked method. Every route is built into a local collection first;
//! the set is published only after the controller key has been claimed, so a
//! second resolution of the same controller publishes nothing.

use crate::catalog::{MethodBody, MethodDescriptor, TypeDescriptor};
use crate::codec::IdentifierCodec;
use crate::factory::Entry;
use crate::metadata::{ControllerMarker, FilterKind, Lifetime, MetadataReader, RouteMarker};
use crate::routing::{
    AfterFilter, Assertion, BeforeFilter, Converter, FilterRef, Handler, RouteCollection,
    RouteDraft,
};
use crate::{Application, Pack, Result, SingularError};
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// The controller being resolved
struct Owner<'t> {
    key: &'t str,
    ty: &'t Arc<TypeDescriptor>,
}

/// Registers controllers and synthesizes their routes
pub struct ControllerResolver<'a> {
    app: &'a Application,
    reader: MetadataReader,
}

impl<'a> ControllerResolver<'a> {
    pub fn new(app: &'a Application) -> Self {
        Self {
            app,
            reader: MetadataReader::new(),
        }
    }

    /// Register `ty` as a controller. Returns the controller key.
    pub fn resolve(
        &self,
        marker: &ControllerMarker,
        ty: &Arc<TypeDescriptor>,
        pack: &Arc<Pack>,
    ) -> Result<String> {
        let short = IdentifierCodec::plain().to_key(ty.short_name())?;
        let key = pack.controller_key(&short);

        if let Some(slot) = self.app.registry().slot(&key) {
            if slot.is_from(ty.symbol()) {
                #[cfg(feature = "logging")]
                trace!(target: "singular", key = %key, "Controller already resolved");

                return Ok(key);
            }
            return Err(SingularError::already_registered(key));
        }

        let mount = if marker.mount.is_empty() {
            format!("{}/{}", pack.name(), short)
        } else {
            marker.mount.clone()
        };

        let owner = Owner { key: &key, ty };
        let mut mounted = RouteCollection::new();
        let mut root = RouteCollection::new();

        for filter in &marker.filters {
            for reference in &filter.methods {
                match filter.kind {
                    FilterKind::Before => mounted.before(self.before_filter(&owner, reference)?),
                    FilterKind::After => mounted.after(self.after_filter(&owner, reference)?),
                }
            }
        }

        for method in self.reader.methods(ty) {
            let Some(route) = self.reader.route(method) else {
                continue;
            };

            let explicit = route.pattern.as_deref().filter(|p| !p.is_empty());
            let draft = self.route(&owner, route, method, explicit)?;

            if explicit.is_some() {
                root.add(draft);
            } else {
                mounted.add(draft);
            }
        }

        let mut bindings = mounted.mount(&mount);
        if !root.is_empty() {
            bindings.extend(root.mount(""));
        }

        let entry = Entry::from_constructor(Lifetime::Shared, ty.constructor(), Arc::clone(pack));
        let routes = self.app.routes();
        let Some(count) = self
            .app
            .registry()
            .bind_with(&key, entry, Some(Arc::clone(ty)), || routes.publish(bindings))?
        else {
            // lost a race with another resolution of the same controller
            return Ok(key);
        };

        #[cfg(feature = "logging")]
        debug!(
            target: "singular",
            key = %key,
            mount = %mount,
            routes = count,
            "Controller resolved"
        );
        #[cfg(not(feature = "logging"))]
        let _ = count;

        Ok(key)
    }

    fn route(
        &self,
        owner: &Owner<'_>,
        marker: &RouteMarker,
        method: &MethodDescriptor,
        explicit: Option<&str>,
    ) -> Result<RouteDraft> {
        let methods = marker
            .verbs()
            .ok_or_else(|| SingularError::RouteMethodNotDefined {
                method: method.name().to_string(),
                controller: owner.ty.symbol().to_string(),
            })?;

        let call = match method.body() {
            MethodBody::Handler(call) => Arc::clone(call),
            _ => return Err(mismatch(owner.ty, method.name(), "a route handler")),
        };

        let pattern = match explicit {
            Some(pattern) => pattern.to_string(),
            None => synthesize_pattern(method),
        };

        let name = marker
            .name
            .clone()
            .unwrap_or_else(|| format!("{}.{}", owner.key, method.name().to_lowercase()));

        let before = self
            .reader
            .filters(method, FilterKind::Before)
            .map(|reference| self.before_filter(owner, reference))
            .collect::<Result<Vec<_>>>()?;

        let after = self
            .reader
            .filters(method, FilterKind::After)
            .map(|reference| self.after_filter(owner, reference))
            .collect::<Result<Vec<_>>>()?;

        let mut converters = BTreeMap::new();
        for spec in self.reader.converters(method) {
            converters.insert(spec.param.clone(), self.converter(owner, &spec.function)?);
        }

        let mut assertions = BTreeMap::new();
        for spec in self.reader.assertions(method) {
            assertions.insert(spec.param.clone(), Assertion::new(&spec.param, &spec.expression)?);
        }

        let defaults = self
            .reader
            .defaults(method)
            .map(|spec| (spec.param.clone(), spec.value.clone()))
            .collect();

        #[cfg(feature = "logging")]
        trace!(
            target: "singular",
            route = %name,
            pattern = %pattern,
            methods = ?methods,
            "Route synthesized"
        );

        Ok(RouteDraft {
            name,
            pattern,
            methods,
            before,
            after,
            converters,
            assertions,
            defaults,
            handler: Handler {
                controller: owner.key.to_string(),
                method: method.name().to_string(),
                call,
            },
        })
    }

    fn before_filter(&self, owner: &Owner<'_>, reference: &str) -> Result<BeforeFilter> {
        let (target, ty) = self.target(owner, reference)?;
        match plain_method(&ty, &target.method)?.body() {
            MethodBody::Before(call) => Ok(BeforeFilter {
                call: Arc::clone(call),
                target,
            }),
            _ => Err(mismatch(&ty, &target.method, "a before filter")),
        }
    }

    fn after_filter(&self, owner: &Owner<'_>, reference: &str) -> Result<AfterFilter> {
        let (target, ty) = self.target(owner, reference)?;
        match plain_method(&ty, &target.method)?.body() {
            MethodBody::After(call) => Ok(AfterFilter {
                call: Arc::clone(call),
                target,
            }),
            _ => Err(mismatch(&ty, &target.method, "an after filter")),
        }
    }

    fn converter(&self, owner: &Owner<'_>, reference: &str) -> Result<Converter> {
        let (target, ty) = self.target(owner, reference)?;
        let method = ty
            .method(&target.method)
            .ok_or_else(|| SingularError::MethodNotDefined {
                method: target.method.clone(),
                type_name: ty.symbol().to_string(),
            })?;

        match method.body() {
            MethodBody::Converter(call) => Ok(Converter {
                call: Arc::clone(call),
                target,
            }),
            _ => Err(mismatch(&ty, &target.method, "a converter")),
        }
    }

    /// Resolve `method` or `service:method` to a key and its type
    ///
    /// Only the target's descriptor is read; the target key is bound when a
    /// request first runs the filter.
    fn target(
        &self,
        owner: &Owner<'_>,
        reference: &str,
    ) -> Result<(FilterRef, Arc<TypeDescriptor>)> {
        let (service, method) = match reference.split_once(':') {
            Some((service, method)) => (service, method),
            None => (owner.key, reference),
        };

        let ty = if service == owner.key {
            Arc::clone(owner.ty)
        } else {
            self.app.descriptor_for(service)?
        };

        Ok((
            FilterRef {
                reference: reference.to_string(),
                service: service.to_string(),
                method: method.to_string(),
            },
            ty,
        ))
    }
}

/// `method/{p1}/{p2}` over the path-bound parameters, in declaration order
pub fn synthesize_pattern(method: &MethodDescriptor) -> String {
    let mut pattern = method.name().to_string();
    for param in method.params().iter().filter(|p| !p.is_injected()) {
        pattern.push_str("/{");
        pattern.push_str(&param.name);
        pattern.push('}');
    }
    pattern
}

/// A filter target must exist and carry no markers of its own
fn plain_method<'t>(ty: &'t TypeDescriptor, name: &str) -> Result<&'t MethodDescriptor> {
    let method = ty.method(name).ok_or_else(|| SingularError::MethodNotDefined {
        method: name.to_string(),
        type_name: ty.symbol().to_string(),
    })?;

    if !method.markers().is_empty() {
        return Err(SingularError::FilterHasAnnotation {
            method: name.to_string(),
            controller: ty.symbol().to_string(),
        });
    }

    Ok(method)
}

fn mismatch(ty: &TypeDescriptor, method: &str, expected: &'static str) -> SingularError {
    SingularError::SignatureMismatch {
        method: method.to_string(),
        type_name: ty.symbol().to_string(),
        expected,
    }
}
