use anyhow::Result;
use framegraph::nodes::{iter_source, log_sink, PreviewerNode, TransformerNode};
use framegraph::{logging, Graph, GraphConfig, Node};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Frame stand-in: a row of pixel intensities.
#[derive(Debug, Clone)]
struct Frame {
    index: u32,
    pixels: Vec<u8>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info")?;

    println!("framegraph - Pipeline Demo");
    println!("==========================\n");

    let config = GraphConfig::from_json(&json!({
        "graph_config": {
            "min_teardown_timeout_ms": 500,
            "teardown_timeout_increment_ms": 250
        }
    }))?;

    let frames = (0..16u32).map(|index| Frame {
        index,
        pixels: (0..8).map(|p| (index * 8 + p) as u8).collect(),
    });
    let mut camera = iter_source("camera", frames);
    camera.setup_func(|| {
        tracing::info!("Camera opened");
        Ok(())
    });

    let mut brighten = TransformerNode::new("brighten", camera.stream());
    brighten.step_func(|mut frame: Frame| {
        for pixel in frame.pixels.iter_mut() {
            *pixel = pixel.saturating_mul(2);
        }
        Ok(frame)
    });

    let mut preview = PreviewerNode::wrap(&brighten);
    preview.step_func(|frame: &Frame| {
        let sum: u32 = frame.pixels.iter().map(|&p| p as u32).sum();
        Ok((frame.index, sum / frame.pixels.len() as u32))
    });

    let display = log_sink("display", preview.stream());
    let thumbnails = log_sink("thumbnails", preview.preview());

    let mut graph = Graph::with_config("demo", config);
    graph
        .set_nodes([
            Box::new(camera) as Box<dyn Node>,
            Box::new(brighten),
            Box::new(preview),
            Box::new(display),
            Box::new(thumbnails),
        ])
        .await;

    let ctx = CancellationToken::new();
    graph.run(ctx.clone());

    // The graph tears itself down once the camera runs out of frames.
    let result = graph.err().recv().await;
    ctx.cancel();

    println!("\n{}", graph.monitor().generate_report());
    match result {
        Ok(()) => println!("Graph finished cleanly"),
        Err(err) => println!("{err}"),
    }

    Ok(())
}
