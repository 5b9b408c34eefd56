//! Resource listing.
//!
//! Unique responsibility: turn paged backend listings into one flat, lazy
//! stream per resource type.
//!
//! - Project-scoped kinds: one paged listing.
//! - Compute instances: zones first, then every zone in listing order. A zone
//!   that answers "not found" contributes nothing; any other zone failure is
//!   surfaced as `ListEvent::ZoneSkipped` and the next zone is listed.
//!
//! An `Err` item ends the stream and aborts the type's pass.

use std::{collections::VecDeque, future::Future};

use futures::{
    StreamExt,
    future,
    stream::{self, BoxStream},
};
use tracing::debug;

use crate::{
    cleanup_types::{ResourceDescriptor, ResourceKind, Scope},
    gcp_backend::{BackendError, CloudBackend, Page},
};

/// One item of a type listing.
#[derive(Debug)]
pub enum ListEvent {
    /// A listed resource.
    Resource(ResourceDescriptor),
    /// A zone whose listing failed; enumeration went on without it.
    ZoneSkipped {
        /// Zone name.
        zone: String,
        /// Why the zone listing failed.
        error: BackendError,
    },
}

/// Stream every resource of `kind` in `project`.
#[must_use]
pub fn list<'a, B>(
    backend: &'a B,
    kind: ResourceKind,
    project: &'a str,
) -> BoxStream<'a, Result<ListEvent, BackendError>>
where
    B: CloudBackend + ?Sized,
{
    if kind.is_zonal() {
        return zonal(backend, kind, project);
    }

    let scope = Scope::project(project);
    paginate(move |token| backend.list_resources(kind, scope.clone(), token))
        .map(|item| item.map(ListEvent::Resource))
        .boxed()
}

/// Stream zone names of `project`.
#[must_use]
pub fn zones<'a, B>(backend: &'a B, project: &'a str) -> BoxStream<'a, Result<String, BackendError>>
where
    B: CloudBackend + ?Sized,
{
    paginate(move |token| backend.list_zones(project.to_string(), token))
}

fn zonal<'a, B>(
    backend: &'a B,
    kind: ResourceKind,
    project: &'a str,
) -> BoxStream<'a, Result<ListEvent, BackendError>>
where
    B: CloudBackend + ?Sized,
{
    zones(backend, project)
        .map(move |zone| match zone {
            Ok(zone) => in_zone(backend, kind, project, zone),
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        })
        .flatten()
        .boxed()
}

fn in_zone<'a, B>(
    backend: &'a B,
    kind: ResourceKind,
    project: &'a str,
    zone: String,
) -> BoxStream<'a, Result<ListEvent, BackendError>>
where
    B: CloudBackend + ?Sized,
{
    let scope = Scope::zone(project, zone.clone());
    paginate(move |token| backend.list_resources(kind, scope.clone(), token))
        .filter_map(move |item| {
            let event = match item {
                Ok(resource) => Some(Ok(ListEvent::Resource(resource))),
                Err(e) if e.is_not_found() => {
                    debug!(%zone, "zone not found, nothing to list");
                    None
                }
                Err(error) => Some(Ok(ListEvent::ZoneSkipped {
                    zone: zone.clone(),
                    error,
                })),
            };
            future::ready(event)
        })
        .boxed()
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Flatten a paged listing into a stream of items.
///
/// `fetch` is called with the page token of the next page (`None` for the
/// first). An empty or missing token ends the listing; an error is yielded
/// once and ends it too.
#[must_use]
pub fn paginate<'a, T, F, Fut>(fetch: F) -> BoxStream<'a, Result<T, BackendError>>
where
    T: Send + 'a,
    F: FnMut(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>, BackendError>> + Send + 'a,
{
    stream::unfold(
        (Cursor::Start, VecDeque::new(), fetch),
        |(mut cursor, mut buffer, mut fetch)| async move {
            loop {
                if let Some(item) = buffer.pop_front() {
                    return Some((Ok(item), (cursor, buffer, fetch)));
                }

                let token = match cursor {
                    Cursor::Done => return None,
                    Cursor::Start => None,
                    Cursor::Next(token) => Some(token),
                };

                match fetch(token).await {
                    Ok(page) => {
                        buffer.extend(page.items);
                        cursor = page
                            .next_page_token
                            .filter(|t| !t.is_empty())
                            .map_or(Cursor::Done, Cursor::Next);
                    }
                    Err(e) => return Some((Err(e), (Cursor::Done, buffer, fetch))),
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use crate::gcp_backend::Service;

    #[tokio::test]
    async fn flattens_pages_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let items: Vec<u32> = paginate(move |token: Option<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                match token.as_deref() {
                    None => Ok(Page::with_next(vec![1, 2], "p2")),
                    Some("p2") => Ok(Page::with_next(vec![], "p3")),
                    Some("p3") => Ok(Page::with_next(vec![3], "")),
                    Some(other) => Err(BackendError::Json(format!("unexpected token {other}"))),
                }
            }
        })
        .filter_map(|r| future::ready(r.ok()))
        .collect()
        .await;

        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn error_is_yielded_once_and_ends_the_stream() {
        let results: Vec<Result<u32, BackendError>> = paginate(|token: Option<String>| async move {
            match token {
                None => Ok(Page::with_next(vec![7], "p2")),
                Some(_) => Err(BackendError::api(Service::Iam, 403, "denied")),
            }
        })
        .collect()
        .await;

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Ok(7)));
        assert!(results[1].is_err());
    }

    #[tokio::test]
    async fn is_lazy_until_polled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut s = paginate(move |_token: Option<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Page::last(vec!["a".to_string()])) }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let first = s.next().await;
        assert!(matches!(first, Some(Ok(ref v)) if v == "a"));
        assert!(s.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
