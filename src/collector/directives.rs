use regex::Regex;
use std::sync::LazyLock;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(^|\s)#.*$").expect("comment pattern"));

static PROXY_PASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bproxy_pass\s+(.*?);").expect("proxy_pass pattern"));

static UPSTREAM_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bupstream\s+([^\s{]+)\s*\{([\s\S]*?)\}").expect("upstream pattern")
});

static SERVER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bserver\s+([^;\s]+)[^;]*;").expect("server pattern"));

static IPV4_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}(:\d+)?$").expect("ipv4 pattern")
});

static HOSTNAME_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*(:\d+)?$",
    )
    .expect("hostname pattern")
});

/// upstream 块：名称 + 按声明顺序排列的 server 地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamGroup {
    pub name: String,
    pub servers: Vec<String>,
}

/// 扫描配置文本中的全部 upstream 块
///
/// 同名块保留各自的条目，查找时取第一个。
pub fn find_upstream_groups(content: &str) -> Vec<UpstreamGroup> {
    let content = strip_comments(content);

    UPSTREAM_BLOCK
        .captures_iter(&content)
        .map(|block| UpstreamGroup {
            name: block[1].to_string(),
            servers: SERVER
                .captures_iter(&block[2])
                .map(|server| server[1].to_string())
                .collect(),
        })
        .collect()
}

/// 从一份配置文本中提取所有 proxy_pass 目标
///
/// 这是尽力而为的文本扫描，而不是配置解析器：
/// - 与同文件内 upstream 块同名的值展开为该块的全部 server 地址
/// - 其余符合 IPv4 或主机名格式（可带端口）的值原样作为目标
/// - 无法识别的值（变量、找不到的 upstream 等）不产生目标
///
/// 结果按出现顺序排列，重复目标不去重。
pub fn extract_proxy_targets(content: &str) -> Vec<String> {
    let groups = find_upstream_groups(content);
    let content = strip_comments(content);
    let mut targets = Vec::new();

    for directive in PROXY_PASS.captures_iter(&content) {
        let Some(value) = normalize_target(&directive[1]) else {
            continue;
        };

        if let Some(group) = groups.iter().find(|group| group.name == value) {
            targets.extend(group.servers.iter().cloned());
        } else if is_direct_target(value) {
            targets.push(value.to_string());
        }
    }

    targets
}

/// 判断值是否为可直接探测的地址（IPv4 或主机名，端口可选）
pub fn is_direct_target(value: &str) -> bool {
    IPV4_TARGET.is_match(value) || HOSTNAME_TARGET.is_match(value)
}

/// 去掉协议前缀和 URI 部分；含变量的值无法静态解析，返回 None
fn normalize_target(raw: &str) -> Option<&str> {
    let value = raw.trim();
    let value = value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"))
        .unwrap_or(value);
    let authority = value.split('/').next().unwrap_or(value);

    if authority.is_empty() || authority.contains('$') {
        None
    } else {
        Some(authority)
    }
}

fn strip_comments(content: &str) -> std::borrow::Cow<'_, str> {
    COMMENT.replace_all(content, "$1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_proxy_pass_yields_nothing() {
        let content = "events {}\nhttp {\n    server {\n        listen 80;\n        root /var/www;\n    }\n}\n";
        assert!(extract_proxy_targets(content).is_empty());
        assert!(extract_proxy_targets("").is_empty());
        assert!(extract_proxy_targets("{{{ ;;; }").is_empty());
    }

    #[test]
    fn test_direct_targets_strip_scheme() {
        let content = r#"
            location /a { proxy_pass http://10.0.0.5:9000; }
            location /b { proxy_pass https://api.example.com; }
            location /c { proxy_pass http://backend.internal:8443; }
        "#;

        assert_eq!(
            extract_proxy_targets(content),
            vec!["10.0.0.5:9000", "api.example.com", "backend.internal:8443"]
        );
    }

    #[test]
    fn test_upstream_members_in_block_order() {
        let content = r#"
            upstream b {
                server 10.0.0.1:80;
                server 10.0.0.2:80;
                server 10.0.0.3:80;
            }
            server {
                location / { proxy_pass http://b; }
            }
        "#;

        assert_eq!(
            extract_proxy_targets(content),
            vec!["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]
        );
    }

    #[test]
    fn test_upstream_single_line_block() {
        let content = "upstream b { server 10.0.0.1:80; server 10.0.0.2:80; }\nproxy_pass http://b;";
        assert_eq!(
            extract_proxy_targets(content),
            vec!["10.0.0.1:80", "10.0.0.2:80"]
        );
    }

    #[test]
    fn test_server_parameters_are_ignored() {
        let content = r#"
            upstream app_pool {
                least_conn;
                server app1.local:8080 weight=5 max_fails=3;
                server 10.1.1.1 backup;
                backup_server 10.9.9.9:1;
            }
            proxy_pass http://app_pool;
        "#;

        assert_eq!(
            extract_proxy_targets(content),
            vec!["app1.local:8080", "10.1.1.1"]
        );
    }

    #[test]
    fn test_unknown_upstream_is_dropped() {
        let content = r#"
            proxy_pass http://missing_pool;
            proxy_pass http://$backend;
            proxy_pass http://10.0.0.9:81;
        "#;

        assert_eq!(extract_proxy_targets(content), vec!["10.0.0.9:81"]);
    }

    #[test]
    fn test_unresolvable_value_contributes_nothing() {
        let content = "proxy_pass unix:/tmp/app.sock;\nproxy_pass http://10.0.0.1:80;";
        assert_eq!(extract_proxy_targets(content), vec!["10.0.0.1:80"]);
    }

    #[test]
    fn test_uri_suffix_removed() {
        let content = "proxy_pass http://10.0.0.5:9000/api/;";
        assert_eq!(extract_proxy_targets(content), vec!["10.0.0.5:9000"]);
    }

    #[test]
    fn test_duplicates_preserved_in_order() {
        let content = r#"
            upstream pool { server 10.0.0.1:80; }
            location /x { proxy_pass http://pool; }
            location /y { proxy_pass http://10.0.0.2:80; }
            location /z { proxy_pass http://pool; }
        "#;

        assert_eq!(
            extract_proxy_targets(content),
            vec!["10.0.0.1:80", "10.0.0.2:80", "10.0.0.1:80"]
        );
    }

    #[test]
    fn test_commented_directives_ignored() {
        let content = "# proxy_pass http://10.0.0.1:80;\n    proxy_pass http://10.0.0.2:80; # old: 10.0.0.3\n";
        assert_eq!(extract_proxy_targets(content), vec!["10.0.0.2:80"]);
    }

    #[test]
    fn test_upstream_name_is_exact() {
        let content = r#"
            upstream backend_b { server 10.0.0.7:80; }
            upstream b { server 10.0.0.8:80; }
            proxy_pass http://b;
        "#;

        assert_eq!(extract_proxy_targets(content), vec!["10.0.0.8:80"]);
    }

    #[test]
    fn test_find_upstream_groups() {
        let content = "upstream one { server a:1; }\nupstream two {\n}\n";
        let groups = find_upstream_groups(content);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "one");
        assert_eq!(groups[0].servers, vec!["a:1"]);
        assert_eq!(groups[1].name, "two");
        assert!(groups[1].servers.is_empty());
    }

    #[test]
    fn test_is_direct_target() {
        assert!(is_direct_target("10.0.0.5:9000"));
        assert!(is_direct_target("10.0.0.5"));
        assert!(is_direct_target("example.com:80"));
        assert!(!is_direct_target("-bad-.com"));
        assert!(!is_direct_target("host:port"));
        assert!(!is_direct_target(""));
    }
}
