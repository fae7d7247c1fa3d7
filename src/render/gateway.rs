use std::future::Future;

use super::provider::{ImageProvider, ProviderOutput, RenderRequest};
use super::RenderError;
use crate::config::ProviderConfig;
use crate::payload::{redact_url_for_log, ImagePayload, ImageRef, PayloadFetcher};

/// 一次渲染的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    /// `None` 表示服务没有产出图片
    pub rendered_image: Option<ImagePayload>,
    /// 服务返回远程地址时记录该地址
    pub rendered_path: Option<String>,
}

impl RenderOutput {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// 渲染网关：源图 -> 渲染图，本身无状态
pub trait RenderGateway: Send + Sync + 'static {
    fn generate_3d_view(
        &self,
        source: &ImageRef,
    ) -> impl Future<Output = Result<RenderOutput, RenderError>> + Send;
}

/// 基于 `ImageProvider` 的默认网关实现
pub struct ProviderRenderGateway<P> {
    provider: P,
    fetcher: PayloadFetcher,
    config: ProviderConfig,
}

impl<P: ImageProvider> ProviderRenderGateway<P> {
    pub fn new(provider: P, fetcher: PayloadFetcher, config: ProviderConfig) -> Self {
        Self { provider, fetcher, config }
    }

    async fn resolve_source(&self, source: &ImageRef) -> Result<ImagePayload, RenderError> {
        match source {
            ImageRef::Payload(payload) => Ok(payload.clone()),
            ImageRef::Url(url) => {
                log::debug!("源图为远程地址，先下载 - {}", redact_url_for_log(url));
                Ok(self.fetcher.fetch_as_payload(url).await?)
            }
        }
    }
}

impl<P: ImageProvider> RenderGateway for ProviderRenderGateway<P> {
    async fn generate_3d_view(&self, source: &ImageRef) -> Result<RenderOutput, RenderError> {
        let payload = self.resolve_source(source).await?;
        let request = RenderRequest::for_source(&payload, &self.config)?;

        match self.provider.txt2img(&request).await? {
            ProviderOutput::Empty => Ok(RenderOutput::empty()),
            ProviderOutput::Image(image) => Ok(RenderOutput {
                rendered_image: Some(image),
                rendered_path: None,
            }),
            ProviderOutput::ImageUrl(url) => {
                let image = self.fetcher.fetch_as_payload(&url).await?;
                Ok(RenderOutput {
                    rendered_image: Some(image),
                    rendered_path: Some(url),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::thread;

    use super::*;
    use crate::config::FetchConfig;
    use crate::payload::PayloadError;

    const PNG_SIGNATURE: [u8; 12] = [137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13];

    struct ScriptedProvider {
        output: ProviderOutput,
        requests: Mutex<Vec<RenderRequest>>,
    }

    impl ScriptedProvider {
        fn new(output: ProviderOutput) -> Self {
            Self { output, requests: Mutex::new(Vec::new()) }
        }
    }

    impl ImageProvider for ScriptedProvider {
        async fn txt2img(&self, request: &RenderRequest) -> Result<ProviderOutput, RenderError> {
            self.requests.lock().expect("lock requests").push(request.clone());
            Ok(self.output.clone())
        }
    }

    fn png() -> ImagePayload {
        ImagePayload::new("image/png", PNG_SIGNATURE.to_vec()).expect("payload")
    }

    fn gateway(output: ProviderOutput) -> ProviderRenderGateway<ScriptedProvider> {
        let fetcher = PayloadFetcher::new(FetchConfig::default()).expect("fetcher");
        ProviderRenderGateway::new(ScriptedProvider::new(output), fetcher, ProviderConfig::default())
    }

    fn serve_png_once() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0_u8; 2048];
                let _ = stream.read(&mut buf);
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    PNG_SIGNATURE.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&PNG_SIGNATURE);
            }
        });
        format!("http://{addr}/render.png")
    }

    #[tokio::test]
    async fn inline_provider_image_has_no_remote_path() {
        let gateway = gateway(ProviderOutput::Image(png()));

        let output = gateway
            .generate_3d_view(&ImageRef::Payload(png()))
            .await
            .expect("generate");

        assert_eq!(output.rendered_image, Some(png()));
        assert!(output.rendered_path.is_none());

        let requests = gateway.provider.requests.lock().expect("lock requests");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].input_image, png().to_base64());
    }

    #[tokio::test]
    async fn empty_provider_output_yields_no_image() {
        let output = gateway(ProviderOutput::Empty)
            .generate_3d_view(&ImageRef::Payload(png()))
            .await
            .expect("generate");
        assert_eq!(output, RenderOutput::empty());
    }

    #[tokio::test]
    async fn provider_url_is_fetched_and_kept_as_path() {
        let url = serve_png_once();
        let output = gateway(ProviderOutput::ImageUrl(url.clone()))
            .generate_3d_view(&ImageRef::Payload(png()))
            .await
            .expect("generate");

        assert_eq!(output.rendered_image, Some(png()));
        assert_eq!(output.rendered_path, Some(url));
    }

    #[tokio::test]
    async fn remote_source_is_fetched_before_provider_call() {
        let url = serve_png_once();
        let gateway = gateway(ProviderOutput::Empty);

        gateway
            .generate_3d_view(&ImageRef::Url(url))
            .await
            .expect("generate");

        let requests = gateway.provider.requests.lock().expect("lock requests");
        assert_eq!(requests[0].input_image_mime_type, "image/png");
    }

    #[tokio::test]
    async fn unreachable_source_fails_without_provider_call() {
        let gateway = gateway(ProviderOutput::Image(png()));

        let result = gateway
            .generate_3d_view(&ImageRef::Url("file:///etc/passwd".to_string()))
            .await;

        assert!(matches!(result, Err(RenderError::Payload(PayloadError::InvalidFormat(_)))));
        assert!(gateway.provider.requests.lock().expect("lock requests").is_empty());
    }
}
