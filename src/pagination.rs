//! Lazy iteration over `opc-next-page` cursors.

use std::future::{Future, ready};

use futures_util::stream::{self, Stream, StreamExt};

use crate::Result;
use crate::binding::OciRequest;

/// A list request that accepts a page cursor.
pub trait PageableRequest: OciRequest + Clone {
    fn set_page(&mut self, page: Option<String>);
}

/// A list response carrying the next cursor, if there is one.
pub trait PageableResponse {
    type Item;

    fn next_page(&self) -> Option<&str>;

    fn into_items(self) -> Vec<Self::Item>;
}

/// Re-issues a list call with each returned cursor until the service stops sending one.
///
/// Every call to [`Paginator::pages`] starts over from the first request; a
/// stream in progress is single-use. Dropping the stream stops paging.
pub struct Paginator<Req, F> {
    first_request: Req,
    list_fn: F,
}

impl<Req, F, Fut, Resp> Paginator<Req, F>
where
    Req: PageableRequest,
    F: Fn(Req) -> Fut,
    Fut: Future<Output = Result<Resp>>,
    Resp: PageableResponse,
{
    pub fn new(first_request: Req, list_fn: F) -> Self {
        Self {
            first_request,
            list_fn,
        }
    }

    pub fn first_request(&self) -> &Req {
        &self.first_request
    }

    /// Whole responses, one per page. The first error ends the stream.
    pub fn pages(&self) -> impl Stream<Item = Result<Resp>> + '_ {
        stream::unfold(Some(self.first_request.clone()), move |next| async move {
            let request = next?;
            match (self.list_fn)(request.clone()).await {
                Ok(response) => {
                    let following = response.next_page().filter(|page| !page.is_empty()).map(|page| {
                        let mut request = request;
                        request.set_page(Some(page.to_owned()));
                        request
                    });
                    Some((Ok(response), following))
                }
                Err(error) => Some((Err(error), None)),
            }
        })
    }

    /// Items of every page, in order.
    pub fn items<'a>(&'a self) -> impl Stream<Item = Result<Resp::Item>> + 'a
    where
        Resp::Item: 'a,
    {
        self.pages().flat_map(|page| match page {
            Ok(response) => stream::iter(response.into_items().into_iter().map(Ok)).left_stream(),
            Err(error) => stream::once(ready(Err(error))).right_stream(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::pin::pin;
    use std::sync::{Arc, Mutex};

    use futures_util::StreamExt;

    use super::{PageableRequest, PageableResponse, Paginator};
    use crate::Result;
    use crate::binding::{OciRequest, RequestDescriptor};
    use crate::error::Error;

    #[derive(Clone, Debug, Default)]
    struct ListThings {
        page: Option<String>,
    }

    impl OciRequest for ListThings {
        fn bind(&self, request: &mut RequestDescriptor) -> Result<()> {
            request.query_opt("page", self.page.as_ref());
            Ok(())
        }
    }

    impl PageableRequest for ListThings {
        fn set_page(&mut self, page: Option<String>) {
            self.page = page;
        }
    }

    struct Page {
        items: Vec<u32>,
        next: Option<String>,
    }

    impl PageableResponse for Page {
        type Item = u32;

        fn next_page(&self) -> Option<&str> {
            self.next.as_deref()
        }

        fn into_items(self) -> Vec<u32> {
            self.items
        }
    }

    /// Pages keyed by the cursor that requests them (`""` for the first page).
    fn service(
        pages: &[(&str, Vec<u32>, Option<&str>)],
        seen: Arc<Mutex<Vec<Option<String>>>>,
    ) -> impl Fn(ListThings) -> std::future::Ready<Result<Page>> + use<> {
        let pages: HashMap<String, (Vec<u32>, Option<String>)> = pages
            .iter()
            .map(|(cursor, items, next)| {
                ((*cursor).to_owned(), (items.clone(), next.map(str::to_owned)))
            })
            .collect();
        move |request: ListThings| {
            seen.lock().expect("seen").push(request.page.clone());
            let key = request.page.clone().unwrap_or_default();
            std::future::ready(match pages.get(&key) {
                Some((items, next)) => Ok(Page {
                    items: items.clone(),
                    next: next.clone(),
                }),
                None => Err(Error::ResponseBinding {
                    operation: "ListThings".to_owned(),
                    message: format!("no page {key}"),
                }),
            })
        }
    }

    #[tokio::test]
    async fn follows_cursors_until_the_last_page() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let paginator = Paginator::new(
            ListThings::default(),
            service(
                &[
                    ("", vec![1, 2], Some("p2")),
                    ("p2", vec![3], Some("p3")),
                    ("p3", vec![4, 5], None),
                ],
                Arc::clone(&seen),
            ),
        );

        let items = paginator
            .items()
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()
            .expect("items");
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            *seen.lock().expect("seen"),
            vec![None, Some("p2".to_owned()), Some("p3".to_owned())]
        );
    }

    #[tokio::test]
    async fn pages_are_lazy_and_restartable() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let paginator = Paginator::new(
            ListThings::default(),
            service(&[("", vec![1], Some("p2")), ("p2", vec![2], None)], Arc::clone(&seen)),
        );

        {
            let mut pages = pin!(paginator.pages());
            let first = pages.next().await.expect("first page").expect("ok");
            assert_eq!(first.items, vec![1]);
        }
        assert_eq!(seen.lock().expect("seen").len(), 1);

        let all = paginator.pages().collect::<Vec<_>>().await;
        assert_eq!(all.len(), 2);
        assert_eq!(seen.lock().expect("seen").len(), 3);
    }

    #[tokio::test]
    async fn error_ends_the_stream() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let paginator = Paginator::new(
            ListThings::default(),
            service(&[("", vec![1], Some("missing"))], Arc::clone(&seen)),
        );
        let pages = paginator.pages().collect::<Vec<_>>().await;
        assert_eq!(pages.len(), 2);
        assert!(pages[0].is_ok());
        let error = pages[1].as_ref().err().expect("second page fails");
        assert_eq!(error.operation(), Some("ListThings"));
        assert_eq!(seen.lock().expect("seen").len(), 2);
    }
}
