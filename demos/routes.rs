use duet_http::{Headers, Methods, ParamKind, Response, Server, Service, StatusCode};
use duet_http::{FileDevice, ReaderDevice};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let service = Service::new();

    // GET /user/42/posts/7
    service
        .route("/user/<arg>/posts/<arg>", Methods::GET, [ParamKind::U32, ParamKind::U32], |_, params| async move {
            let (user, post) = (params.get::<u32>(0), params.get::<u32>(1));
            format!("user {user:?}, post {post:?}")
        })
        .unwrap();

    // POST /echo
    service
        .route("/echo", Methods::POST | Methods::PUT, [], |req, _| async move {
            Response::with_mime("application/octet-stream", req.body(), StatusCode::OK)
        })
        .unwrap();

    // GET /files/some/nested/name.txt
    service
        .route_with_responder("/files/<arg>", Methods::GET | Methods::HEAD, [ParamKind::Url], |_, params, mut responder| async move {
            let name = params.str(0).unwrap_or_default().replace("..", "");
            let headers = Headers::from([("Content-Type", "text/plain")]);
            let _ = responder
                .write_stream(FileDevice::new(format!("./{name}")), &headers, StatusCode::OK)
                .await;
        })
        .unwrap();

    // GET /ticker: chunked, with a trailer
    service
        .route_with_responder("/ticker", Methods::GET, [], |_, _, mut responder| async move {
            let _ = responder.write_chunked_begin(&Headers::new(), StatusCode::OK).await;
            for tick in 0..5 {
                let _ = responder.write_chunk(format!("tick {tick}\n").as_bytes()).await;
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            let _ = responder.write_chunked_end(b"done\n", &Headers::from([("X-Ticks", "5")])).await;
        })
        .unwrap();

    // GET /greeting: a reader with a known size
    service
        .route_with_responder("/greeting", Methods::GET, [], |_, _, mut responder| async move {
            let body: &'static [u8] = b"Hello from a reader!";
            let device = ReaderDevice::with_size(body, body.len() as u64);
            let _ = responder.write_stream(device, &Headers::new(), StatusCode::OK).await;
        })
        .unwrap();

    service.before_request(|req| match req.header("x-block") {
        Some(_) => Some(Response::with_body("blocked", StatusCode::FORBIDDEN)),
        None => None,
    });
    service.after_request(|mut resp, _| {
        resp.set_header("Server", "duet_http");
        resp
    });
    service.set_missing_handler(|req| Response::with_body(format!("nothing at {}", req.path()), StatusCode::NOT_FOUND));

    Server::builder()
        .bind("127.0.0.1:8080".parse().unwrap())?
        .handler(service)
        .build()
        .launch()
        .await;
    Ok(())
}
