use std::sync::Arc;

use async_trait::async_trait;
use autoquality_core::Document;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page as CdpPage;
use serde_json::Value;
use tracing::debug;

use crate::BrowserError;
use crate::Result;

/// [`Document`] backed by a live Chrome tab.
///
/// Queries go through `DOM.querySelectorAll` so an element that has not
/// rendered yet is an empty result rather than an error. Reads and clicks run
/// small functions on the element's remote object, the same activation a
/// script calling `element.click()` would produce.
pub struct CdpDocument {
    page: Arc<CdpPage>,
}

impl CdpDocument {
    pub fn new(page: Arc<CdpPage>) -> Self {
        Self { page }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>> {
        Ok(self.page.find_elements(selector).await?)
    }

    async fn call(&self, element: &Element, function: String) -> Result<Value> {
        let returns = element.call_js_fn(function, false).await?;
        if let Some(details) = returns.exception_details {
            return Err(BrowserError::CdpError(format!(
                "script threw on element: {}",
                details.text
            )));
        }
        Ok(returns.result.value.unwrap_or(Value::Null))
    }
}

fn string_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

#[async_trait]
impl Document for CdpDocument {
    type Handle = Element;

    async fn query_selector(&self, selector: &str) -> autoquality_core::Result<Option<Element>> {
        let mut elements = self.find_all(selector).await?;
        if elements.is_empty() {
            return Ok(None);
        }
        Ok(Some(elements.swap_remove(0)))
    }

    async fn query_selector_all(&self, selector: &str) -> autoquality_core::Result<Vec<Element>> {
        Ok(self.find_all(selector).await?)
    }

    async fn text_content(&self, handle: &Element) -> autoquality_core::Result<Option<String>> {
        let value = self
            .call(handle, "function() { return this.textContent; }".to_string())
            .await?;
        Ok(string_value(value))
    }

    async fn sibling_text(
        &self,
        handle: &Element,
        selector: &str,
    ) -> autoquality_core::Result<Option<String>> {
        let selector_json = serde_json::to_string(selector)
            .map_err(|e| BrowserError::CdpError(format!("selector encoding failed: {e}")))?;
        let function = format!(
            "function() {{ const parent = this.parentNode; \
             const label = parent && parent.querySelector({selector_json}); \
             return label ? label.textContent : null; }}"
        );
        let value = self.call(handle, function).await?;
        Ok(string_value(value))
    }

    async fn click(&self, handle: &Element) -> autoquality_core::Result<()> {
        debug!("clicking element");
        self.call(handle, "function() { this.click(); }".to_string())
            .await?;
        Ok(())
    }

    async fn check(&self, handle: &Element) -> autoquality_core::Result<()> {
        debug!("checking input");
        self.call(
            handle,
            "function() { this.checked = true; this.click(); }".to_string(),
        )
        .await?;
        Ok(())
    }
}
