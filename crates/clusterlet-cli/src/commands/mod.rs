//! CLI commands implementation

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;

/// API client for communicating with the daemon
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Error body from the API
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Node response from API
#[derive(Debug, Deserialize)]
pub struct NodeResponse {
    pub id: String,
    pub cpu_cores: u32,
    pub available_cpu: u32,
    pub status: String,
    pub pods: Vec<String>,
    pub created_at: String,
    pub last_heartbeat: String,
    pub recovery_requested: bool,
}

#[derive(Debug, Deserialize)]
pub struct NodeListResponse {
    pub nodes: Vec<NodeResponse>,
    pub total_nodes: usize,
    pub last_updated: String,
}

#[derive(Debug, Deserialize)]
pub struct AddNodeResponse {
    pub message: String,
    pub available_cpu: u32,
}

/// Pod response from API
#[derive(Debug, Deserialize)]
pub struct PodResponse {
    pub id: String,
    pub node_id: Option<String>,
    pub cpu_required: u32,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct PodListResponse {
    pub pods: Vec<PodResponse>,
    pub total_pods: usize,
}

#[derive(Debug, Deserialize)]
pub struct LaunchPodResponse {
    pub message: String,
}

/// Status response
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub backend: String,
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub unhealthy_nodes: usize,
    pub stopped_nodes: usize,
    pub error_nodes: usize,
    pub total_cpu: u64,
    pub available_cpu: u64,
    pub running_pods: usize,
    pub pending_pods: usize,
}

async fn report_error(response: reqwest::Response, action: &str) -> Result<()> {
    let status = response.status();
    let text = response.text().await?;
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or(text);
    eprintln!("Failed to {} ({}): {}", action, status, message);
    Ok(())
}

/// Register a node
pub async fn add_node(client: &ApiClient, cpu: i64) -> Result<()> {
    let response = client
        .client
        .post(client.url("/nodes"))
        .json(&json!({ "cpu_cores": cpu }))
        .send()
        .await?;

    if response.status().is_success() {
        let added: AddNodeResponse = response.json().await?;
        println!("{}", added.message);
        println!("  Available CPU: {}", added.available_cpu);
    } else {
        report_error(response, "add node").await?;
    }

    Ok(())
}

/// List all nodes
pub async fn list_nodes(client: &ApiClient) -> Result<()> {
    let response = client.client.get(client.url("/nodes")).send().await?;

    if response.status().is_success() {
        let list: NodeListResponse = response.json().await?;

        if list.nodes.is_empty() {
            println!("No nodes registered");
        } else {
            println!(
                "{:<10} {:<10} {:<12} {:<6} {:<28}",
                "ID", "STATUS", "CPU", "PODS", "LAST HEARTBEAT"
            );
            println!("{}", "-".repeat(70));
            for node in &list.nodes {
                println!(
                    "{:<10} {:<10} {:>4}/{:<7} {:<6} {:<28}",
                    node.id,
                    node.status,
                    node.available_cpu,
                    node.cpu_cores,
                    node.pods.len(),
                    node.last_heartbeat
                );
            }
            println!("\n{} node(s), updated {}", list.total_nodes, list.last_updated);
        }
    } else {
        report_error(response, "list nodes").await?;
    }

    Ok(())
}

/// Show one node
pub async fn get_node(client: &ApiClient, id: &str) -> Result<()> {
    let response = client
        .client
        .get(client.url(&format!("/nodes/{}", id)))
        .send()
        .await?;

    if response.status().is_success() {
        let node: NodeResponse = response.json().await?;
        print_node_details(&node);
    } else {
        report_error(response, "get node").await?;
    }

    Ok(())
}

/// Run a node action (heartbeat, stop, resume, recover)
pub async fn node_action(client: &ApiClient, id: &str, action: &str) -> Result<()> {
    let response = client
        .client
        .post(client.url(&format!("/nodes/{}/{}", id, action)))
        .send()
        .await?;

    if response.status().is_success() {
        let node: NodeResponse = response.json().await?;
        println!("{}: {} -> {}", action, node.id, node.status);
    } else {
        report_error(response, action).await?;
    }

    Ok(())
}

/// Launch a pod
pub async fn launch_pod(client: &ApiClient, cpu: i64) -> Result<()> {
    let response = client
        .client
        .post(client.url("/pods"))
        .json(&json!({ "cpu_required": cpu }))
        .send()
        .await?;

    if response.status().is_success() {
        let launched: LaunchPodResponse = response.json().await?;
        println!("{}", launched.message);
    } else {
        report_error(response, "launch pod").await?;
    }

    Ok(())
}

/// List all pods
pub async fn list_pods(client: &ApiClient) -> Result<()> {
    let response = client.client.get(client.url("/pods")).send().await?;

    if response.status().is_success() {
        let list: PodListResponse = response.json().await?;

        if list.pods.is_empty() {
            println!("No pods found");
        } else {
            println!(
                "{:<10} {:<10} {:<6} {:<20}",
                "ID", "NODE", "CPU", "STATUS"
            );
            println!("{}", "-".repeat(50));
            for pod in &list.pods {
                println!(
                    "{:<10} {:<10} {:<6} {:<20}",
                    pod.id,
                    pod.node_id.as_deref().unwrap_or("-"),
                    pod.cpu_required,
                    pod.status
                );
            }
            println!("\n{} pod(s)", list.total_pods);
        }
    } else {
        report_error(response, "list pods").await?;
    }

    Ok(())
}

/// Show one pod
pub async fn get_pod(client: &ApiClient, id: &str) -> Result<()> {
    let response = client
        .client
        .get(client.url(&format!("/pods/{}", id)))
        .send()
        .await?;

    if response.status().is_success() {
        let pod: PodResponse = response.json().await?;
        println!("Pod: {}", pod.id);
        println!("  Node: {}", pod.node_id.as_deref().unwrap_or("-"));
        println!("  CPU: {}", pod.cpu_required);
        println!("  Status: {}", pod.status);
        println!("  Created: {}", pod.created_at);
    } else {
        report_error(response, "get pod").await?;
    }

    Ok(())
}

/// Show cluster status
pub async fn top(client: &ApiClient) -> Result<()> {
    let response = client.client.get(client.url("/status")).send().await?;

    if response.status().is_success() {
        let status: StatusResponse = response.json().await?;

        println!("clusterlet v{} ({} backend)", status.version, status.backend);
        println!();
        println!(
            "Nodes: {} total, {} healthy, {} unhealthy, {} stopped, {} error",
            status.total_nodes,
            status.healthy_nodes,
            status.unhealthy_nodes,
            status.stopped_nodes,
            status.error_nodes
        );
        println!(
            "CPU: {}/{} available on healthy nodes",
            status.available_cpu, status.total_cpu
        );
        println!(
            "Pods: {} running, {} pending reschedule",
            status.running_pods, status.pending_pods
        );
    } else {
        report_error(response, "get status").await?;
    }

    Ok(())
}

/// Helper to print node details
fn print_node_details(node: &NodeResponse) {
    println!("Node: {}", node.id);
    println!("  Status: {}", node.status);
    println!("  CPU: {}/{} available", node.available_cpu, node.cpu_cores);
    println!("  Pods: {:?}", node.pods);
    println!("  Created: {}", node.created_at);
    println!("  Last heartbeat: {}", node.last_heartbeat);
    if node.recovery_requested {
        println!("  Recovery requested, awaiting heartbeat");
    }
}
