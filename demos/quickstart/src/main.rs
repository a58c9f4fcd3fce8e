//! Quickstart Demo
//!
//! Demonstrates the resource tree, inherited configuration, and the
//! lifecycle hooks against the JSONPlaceholder test API.

// Demo-specific lint allowances
#![allow(clippy::print_stdout)]

use std::sync::Arc;
use std::time::Duration;

use trellis::prelude::*;

/// A JSONPlaceholder post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "userId")]
    pub user_id: u64,
    #[serde(default)]
    pub id: u64,
    pub title: String,
    pub body: String,
}

fn main() -> trellis::Result<()> {
    let client = RestClient::new("https://jsonplaceholder.typicode.com")?;

    // configuration set here is inherited by every descendant resource
    let root = client.root();
    root.set_timeout(Duration::from_secs(10))?;
    root.set_header("accept", "application/json")?;

    let posts = root.child("posts")?;
    posts.on_preflight(Arc::new(|request| {
        println!("-> {} {}", request.method(), request.url());
        true
    }))?;

    // GET /posts/1, blocking until the envelope settles
    let response = posts.child(1)?.get()?;
    println!("<- status {:?}", response.status());
    let post: Post = response.json()?;
    println!("   title: {}", post.title);

    // POST /posts with a JSON body
    let draft = Post {
        user_id: 1,
        id: 0,
        title: "hello trellis".to_string(),
        body: "posted from the quickstart demo".to_string(),
    };
    let response = posts.request(Method::Post)?.json(&draft)?.send()?;
    println!("<- status {:?}", response.status());

    // async dispatch with a per-call completion hook
    let (tx, rx) = std::sync::mpsc::channel();
    let _handle = posts
        .child(2)?
        .request(Method::Get)?
        .on_complete(Box::new(move |envelope| {
            let _ = tx.send(envelope.is_success());
        }))
        .dispatch()?;
    let succeeded = rx
        .recv_timeout(Duration::from_secs(30))
        .unwrap_or_default();
    println!("async GET /posts/2 succeeded: {succeeded}");

    client.shutdown();
    Ok(())
}
