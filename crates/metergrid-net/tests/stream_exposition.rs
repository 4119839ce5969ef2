//! End-to-end: bytes moved through a metered stream show up in the
//! rendered exposition.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use metergrid_http::{Exporter, ExporterConfig};
use metergrid_net::MeteredStream;

#[tokio::test]
async fn stream_traffic_renders_as_conn_metrics() {
    let exporter = Arc::new(Exporter::new(ExporterConfig::default()));

    let (client, mut server) = tokio::io::duplex(4096);
    let mut stream = MeteredStream::new(client, exporter.clone(), "duplex");

    stream.write_all(&[0u8; 512]).await.unwrap();
    server.write_all(&[0u8; 64]).await.unwrap();
    let mut buf = [0u8; 64];
    stream.read_exact(&mut buf).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut body = Vec::new();
    exporter.render_into(&mut body).unwrap();
    let text = String::from_utf8(body).unwrap();

    assert!(text.contains("# TYPE conn.open.count counter"));
    assert!(text.contains("conn.open.count{protocol=\"duplex\"} 1 "));
    assert!(text.contains("conn.close.count{protocol=\"duplex\"} 1 "));
    // 512 bytes land in the 1 KB bucket, 64 bytes in the 100 B
    // bucket; the `le` label is appended after the base labels.
    assert!(text.contains("conn.write.bytes_bucket{protocol=\"duplex\",le=\"1000\"} 1 "));
    assert!(text.contains("conn.read.bytes_bucket{protocol=\"duplex\",le=\"100\"} 1 "));
    assert!(text.contains("conn.write.bytes_sum{protocol=\"duplex\"} 512 "));
    assert!(text.contains("# TYPE conn.read.bytes histogram"));
}
